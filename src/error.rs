use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::nvme::StatusField;

#[derive(Debug, Error)]
pub enum SmartError {
    /// The OS refused to open the device or rejected the passthrough call.
    #[error("platform error: {0}")]
    Platform(io::Error),
    #[error("NVMe command failed with status code {code:#04x} (status code type {code_type})")]
    StatusField {
        code: u8,
        code_type: u8,
        field: StatusField,
    },
    #[error("device {} is already open", .0.display())]
    AlreadyOpen(PathBuf),
    #[error("device {} is not open", .0.display())]
    NotOpen(PathBuf),
    #[error("malformed {structure}: need {expected} bytes, got {actual}")]
    MalformedStructure {
        structure: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("command block is {len} bytes, the limit is {max}")]
    CommandTooLong { len: usize, max: usize },
    #[error("unsupported by this device backend: {0}")]
    Unsupported(String),
}

impl SmartError {
    /// Captures the calling thread's last OS error as a transport failure.
    pub fn last_os_error() -> Self {
        SmartError::Platform(io::Error::last_os_error())
    }

    /// The raw OS error code behind a transport failure, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            SmartError::Platform(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

impl From<io::Error> for SmartError {
    fn from(err: io::Error) -> Self {
        SmartError::Platform(err)
    }
}

#[cfg(target_os = "linux")]
impl From<nix::Error> for SmartError {
    fn from(err: nix::Error) -> Self {
        SmartError::Platform(io::Error::from(err))
    }
}

pub type Result<T> = std::result::Result<T, SmartError>;
