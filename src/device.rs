//! Device lifecycle and the NVMe query layer built on top of it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use zerocopy::{FromZeros, IntoBytes};

use crate::codec::{trim_text, FieldTable, FieldValue, WireStruct};
use crate::error::{Result, SmartError};
use crate::nvme::{
    log_page_cdw10, AdminCommand, CriticalWarning, IdentifyController, SmartLog,
    NVME_ADMIN_GET_LOG_PAGE, NVME_ADMIN_IDENTIFY, NVME_IDENTIFY_CNS_CONTROLLER,
    NVME_LOG_SMART_INFO, NVME_NSID_ALL,
};
use crate::status::NvmeResponse;

/// Open/close lifecycle shared by every device backend.
pub trait Device {
    fn path(&self) -> &Path;

    /// Acquires the OS handle. Fails if the device is already open.
    fn open(&mut self) -> Result<()>;

    /// Releases the OS handle. Closing a closed device does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Holds at most one OS handle for a device path.
#[derive(Debug)]
pub struct DeviceHandle<H> {
    path: PathBuf,
    handle: Option<H>,
}

impl<H> DeviceHandle<H> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn open_with<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<H>,
    {
        if self.handle.is_some() {
            return Err(SmartError::AlreadyOpen(self.path.clone()));
        }
        let handle = open(&self.path)?;
        debug!("opened {}", self.path.display());
        self.handle = Some(handle);
        Ok(())
    }

    /// Drops the handle, which closes it.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("closed {}", self.path.display());
        }
    }

    pub fn get(&self) -> Result<&H> {
        self.handle
            .as_ref()
            .ok_or_else(|| SmartError::NotOpen(self.path.clone()))
    }
}

/// The most useful SMART values, condensed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SmartHealth {
    pub temperature_celsius: i64,
    pub percentage_used: u8,
    pub power_on_hours: u64,
    pub power_cycles: u64,
    pub unsafe_shutdowns: u64,
    pub media_errors: u64,
    pub critical_warning: CriticalWarning,
}

impl From<&SmartLog> for SmartHealth {
    fn from(log: &SmartLog) -> Self {
        SmartHealth {
            temperature_celsius: kelvin_to_celsius(log.temperature.get()),
            percentage_used: log.percent_used,
            power_on_hours: log.power_on_hours.saturating_u64(),
            power_cycles: log.power_cycles.saturating_u64(),
            unsafe_shutdowns: log.unsafe_shutdowns.saturating_u64(),
            media_errors: log.media_errors.saturating_u64(),
            critical_warning: log.critical_warning,
        }
    }
}

/// Whole degrees Celsius, truncated toward zero.
pub fn kelvin_to_celsius(kelvin: u16) -> i64 {
    (f64::from(kelvin) - 273.15) as i64
}

/// A device that accepts NVMe admin commands.
///
/// Backends only implement [`issue_admin_command`](Self::issue_admin_command);
/// the queries are written against it.
pub trait NvmeDevice: Device {
    /// Submits `command` with `data` as its transfer buffer and waits for it
    /// to complete. The buffer's address and length overwrite `addr` and
    /// `data_len`.
    fn issue_admin_command(&mut self, command: AdminCommand, data: &mut [u8])
        -> Result<NvmeResponse>;

    /// Identify Controller (CNS 01h).
    fn identify(&mut self) -> Result<(IdentifyController, NvmeResponse)> {
        let mut data = IdentifyController::new_zeroed();
        let mut command = AdminCommand::new(NVME_ADMIN_IDENTIFY);
        command.cdw10 = NVME_IDENTIFY_CNS_CONTROLLER;
        let response = self.issue_admin_command(command, data.as_mut_bytes())?;
        Ok((data, response))
    }

    /// Reads log page `log_page_id` controller-wide into `page`, sized by
    /// the page type.
    fn read_log_page<T>(&mut self, log_page_id: u8, mut page: T) -> Result<(T, NvmeResponse)>
    where
        T: WireStruct,
        Self: Sized,
    {
        let mut command = AdminCommand::new(NVME_ADMIN_GET_LOG_PAGE);
        command.nsid = NVME_NSID_ALL;
        command.cdw10 = log_page_cdw10(log_page_id, T::SIZE);
        let response = self.issue_admin_command(command, page.as_mut_bytes())?;
        Ok((page, response))
    }

    fn smart(&mut self) -> Result<(SmartLog, NvmeResponse)>
    where
        Self: Sized,
    {
        self.read_log_page(NVME_LOG_SMART_INFO, SmartLog::new_zeroed())
    }

    /// Composite temperature in degrees Celsius.
    fn temperature(&mut self) -> Result<i64>
    where
        Self: Sized,
    {
        let (smart, _) = self.smart()?;
        Ok(kelvin_to_celsius(smart.temperature.get()))
    }

    fn serial(&mut self) -> Result<String> {
        let (identify, _) = self.identify()?;
        Ok(trim_text(&identify.serial_number))
    }

    fn model(&mut self) -> Result<String> {
        let (identify, _) = self.identify()?;
        Ok(trim_text(&identify.model_number))
    }

    fn firmware(&mut self) -> Result<String> {
        let (identify, _) = self.identify()?;
        Ok(trim_text(&identify.firmware_revision))
    }

    fn smart_table(&mut self) -> Result<BTreeMap<&'static str, FieldValue>>
    where
        Self: Sized,
    {
        let (smart, _) = self.smart()?;
        Ok(smart.fields().into_iter().collect())
    }

    fn health(&mut self) -> Result<SmartHealth>
    where
        Self: Sized,
    {
        let (smart, _) = self.smart()?;
        Ok(SmartHealth::from(&smart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_twice_fails_and_reopen_after_close_succeeds() {
        let mut handle: DeviceHandle<u32> = DeviceHandle::new("/dev/nvme0");
        handle.open_with(|_| Ok(1)).unwrap();
        assert!(matches!(
            handle.open_with(|_| Ok(2)),
            Err(SmartError::AlreadyOpen(_))
        ));
        assert_eq!(*handle.get().unwrap(), 1);

        handle.close();
        handle.close();
        assert!(!handle.is_open());
        handle.open_with(|_| Ok(3)).unwrap();
        assert_eq!(*handle.get().unwrap(), 3);
    }

    #[test]
    fn closed_handle_is_not_usable() {
        let handle: DeviceHandle<u32> = DeviceHandle::new("/dev/sda");
        match handle.get() {
            Err(SmartError::NotOpen(path)) => assert_eq!(path, PathBuf::from("/dev/sda")),
            other => panic!("expected NotOpen, got {other:?}"),
        }
    }

    #[test]
    fn failed_open_leaves_device_closed() {
        let mut handle: DeviceHandle<u32> = DeviceHandle::new("/dev/nvme9");
        let err = handle
            .open_with(|_| Err(SmartError::Platform(std::io::Error::from_raw_os_error(2))))
            .unwrap_err();
        assert_eq!(err.os_code(), Some(2));
        assert!(!handle.is_open());
    }

    #[test]
    fn celsius_truncates_toward_zero() {
        assert_eq!(kelvin_to_celsius(300), 26);
        assert_eq!(kelvin_to_celsius(273), 0);
        assert_eq!(kelvin_to_celsius(0), -273);
    }
}
