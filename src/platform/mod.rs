//! Per-OS command issuers.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

#[cfg(target_os = "linux")]
pub use linux::{LinuxNvmeDevice as PlatformNvmeDevice, LinuxScsiDevice as PlatformScsiDevice};

#[cfg(windows)]
pub use windows::{
    WindowsNvmeDevice as PlatformNvmeDevice, WindowsScsiDevice as PlatformScsiDevice,
};
