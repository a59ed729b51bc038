//! # smart-passthrough
//! Reads S.M.A.R.T. health and identity data from NVMe and SCSI devices by
//! sending raw commands through the operating system's passthrough ioctls,
//! without relying on external tools like `smartctl`.
//!
//! ## Backends
//! *   **Linux**: NVMe through `NVME_IOCTL_ADMIN_CMD`, SCSI through `SG_IO`.
//! *   **Windows**: SCSI through `IOCTL_SCSI_PASS_THROUGH_DIRECT`, NVMe through
//!     the protocol-specific `IOCTL_STORAGE_QUERY_PROPERTY` queries.
//!
//! ```no_run
//! use smart_passthrough::{Device, NvmeDevice, PlatformNvmeDevice};
//!
//! # fn main() -> smart_passthrough::Result<()> {
//! let mut dev = PlatformNvmeDevice::new("/dev/nvme0");
//! dev.open()?;
//! println!("{} at {} C", dev.model()?, dev.temperature()?);
//! dev.close();
//! # Ok(())
//! # }
//! ```
//!
//! Opening a device requires administrator/root privileges.

pub mod codec;
pub mod device;
pub mod error;
pub mod nvme;
pub mod scsi;
pub mod status;
pub mod storage;

#[cfg(any(target_os = "linux", windows))]
pub mod platform;

pub use codec::{trim_text, FieldTable, FieldValue, U128Le, WireStruct};
pub use device::{kelvin_to_celsius, Device, DeviceHandle, NvmeDevice, SmartHealth};
pub use error::{Result, SmartError};
pub use nvme::{AdminCommand, CriticalWarning, IdentifyController, SmartLog, StatusField};
pub use scsi::{CommandBlock, Direction, ScsiDevice, Sense, DEFAULT_SCSI_TIMEOUT_MS};
pub use status::{completion_status, parse_status_field, NvmeResponse};

#[cfg(any(target_os = "linux", windows))]
pub use platform::{PlatformNvmeDevice, PlatformScsiDevice};
