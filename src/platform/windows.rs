use std::ffi::c_void;
use std::mem::size_of;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::null_mut;

use log::debug;
use windows_sys::Win32::{
    Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, OPEN_EXISTING},
    System::Ioctl::{
        NVMeDataTypeIdentify, NVMeDataTypeLogPage, PropertyStandardQuery, ProtocolTypeNvme,
        StorageAdapterProtocolSpecificProperty, IOCTL_STORAGE_QUERY_PROPERTY,
    },
    System::IO::DeviceIoControl,
};
use zerocopy::{FromZeros, IntoBytes};

use crate::codec::WireStruct;
use crate::device::{Device, DeviceHandle, NvmeDevice};
use crate::error::{Result, SmartError};
use crate::nvme::{AdminCommand, NVME_ADMIN_GET_LOG_PAGE, NVME_ADMIN_IDENTIFY};
use crate::scsi::{
    CommandBlock, Direction, ScsiDevice, ScsiPassThroughDirectWithBuffer, Sense,
    IOCTL_SCSI_PASS_THROUGH_DIRECT,
};
use crate::status::NvmeResponse;
use crate::storage::{copy_protocol_data, ProtocolQuery, ProtocolSpecificData};

#[derive(Debug)]
pub struct WindowsDeviceHandle(HANDLE);

impl Drop for WindowsDeviceHandle {
    fn drop(&mut self) {
        if self.0 != INVALID_HANDLE_VALUE {
            unsafe { CloseHandle(self.0) };
        }
    }
}

/// Opens a raw device path such as `\\.\PhysicalDrive0`.
///
/// `std::fs::File` can't be used here: its open flags and sharing mode are
/// rejected by raw device paths.
fn open_device(path: &Path) -> Result<WindowsDeviceHandle> {
    let wide_path: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let handle = unsafe {
        CreateFileW(
            wide_path.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            FILE_SHARE_READ,
            null_mut(),
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        Err(SmartError::last_os_error())
    } else {
        Ok(WindowsDeviceHandle(handle))
    }
}

/// Issues one in-place `DeviceIoControl` on `buffer`. Returns the number of
/// bytes written back, or the OS error captured right after the call.
fn device_io_control(handle: &WindowsDeviceHandle, code: u32, buffer: &mut [u8]) -> (u32, Option<SmartError>) {
    let mut bytes_returned: u32 = 0;
    let ptr = buffer.as_mut_ptr().cast::<c_void>();
    let ok = unsafe {
        DeviceIoControl(
            handle.0,
            code,
            ptr,
            buffer.len() as u32,
            ptr,
            buffer.len() as u32,
            &mut bytes_returned,
            null_mut(),
        )
    };
    let err = (ok == 0).then(SmartError::last_os_error);
    (bytes_returned, err)
}

macro_rules! impl_device {
    ($ty:ty) => {
        impl $ty {
            pub fn new(path: impl Into<PathBuf>) -> Self {
                Self {
                    handle: DeviceHandle::new(path),
                }
            }
        }

        impl Device for $ty {
            fn path(&self) -> &Path {
                self.handle.path()
            }

            fn open(&mut self) -> Result<()> {
                self.handle.open_with(open_device)
            }

            fn close(&mut self) {
                self.handle.close();
            }

            fn is_open(&self) -> bool {
                self.handle.is_open()
            }
        }
    };
}

/// A disk driven through `IOCTL_SCSI_PASS_THROUGH_DIRECT`.
#[derive(Debug)]
pub struct WindowsScsiDevice {
    handle: DeviceHandle<WindowsDeviceHandle>,
}

impl_device!(WindowsScsiDevice);

impl ScsiDevice for WindowsScsiDevice {
    fn issue_command(
        &mut self,
        direction: Direction,
        command: &[u8],
        data: &mut [u8],
        timeout_ms: u32,
    ) -> Result<Sense> {
        let handle = self.handle.get()?;
        let cdb = CommandBlock::new(command)?;
        debug!(
            "{}: scsi cdb={:02x?} dir={:?} len={}",
            self.handle.path().display(),
            &cdb.bytes()[..usize::from(cdb.len())],
            direction,
            data.len()
        );

        let mut header = ScsiPassThroughDirectWithBuffer::new(direction, &cdb, data, timeout_ms);
        let (_, err) = device_io_control(handle, IOCTL_SCSI_PASS_THROUGH_DIRECT, header.as_mut_bytes());

        // The header may be partially filled even when the call failed.
        self.inspect_sense(&header.sense);
        match err {
            Some(err) => Err(err),
            None => Ok(header.sense),
        }
    }
}

/// An NVMe disk behind the inbox `stornvme` driver.
///
/// The driver only exposes a fixed set of admin commands through
/// `IOCTL_STORAGE_QUERY_PROPERTY`; IDENTIFY and GET LOG PAGE are mapped here.
#[derive(Debug)]
pub struct WindowsNvmeDevice {
    handle: DeviceHandle<WindowsDeviceHandle>,
}

impl_device!(WindowsNvmeDevice);

fn protocol_query(command: &AdminCommand, data_len: usize) -> Result<ProtocolQuery> {
    let mut protocol = ProtocolSpecificData::new_zeroed();
    protocol.protocol_type = ProtocolTypeNvme as u32;
    protocol.request_value = command.cdw10 & 0xff;
    protocol.data_offset = size_of::<ProtocolSpecificData>() as u32;
    protocol.data_length = data_len as u32;
    match command.opcode {
        NVME_ADMIN_IDENTIFY => {
            protocol.data_type = NVMeDataTypeIdentify as u32;
            protocol.request_sub_value = command.nsid;
        }
        NVME_ADMIN_GET_LOG_PAGE => {
            protocol.data_type = NVMeDataTypeLogPage as u32;
            protocol.request_sub_value = command.cdw12;
            protocol.request_sub_value2 = command.cdw13;
        }
        opcode => {
            return Err(SmartError::Unsupported(format!(
                "admin opcode {opcode:#04x} through IOCTL_STORAGE_QUERY_PROPERTY"
            )))
        }
    }
    Ok(ProtocolQuery {
        property_id: StorageAdapterProtocolSpecificProperty as u32,
        query_type: PropertyStandardQuery as u32,
        protocol,
    })
}

impl NvmeDevice for WindowsNvmeDevice {
    fn issue_admin_command(
        &mut self,
        mut command: AdminCommand,
        data: &mut [u8],
    ) -> Result<NvmeResponse> {
        let handle = self.handle.get()?;
        command.attach(data);
        let query = protocol_query(&command, data.len())?;
        debug!(
            "{}: admin opcode={:#04x} nsid={:#x} cdw10={:#010x} len={}",
            self.handle.path().display(),
            command.opcode,
            command.nsid,
            command.cdw10,
            command.data_len
        );

        let header_len = size_of::<ProtocolQuery>();
        let mut buffer = vec![0u8; header_len + data.len()];
        buffer[..header_len].copy_from_slice(query.as_bytes());

        let (bytes_returned, err) = device_io_control(handle, IOCTL_STORAGE_QUERY_PROPERTY, &mut buffer);
        if let Some(err) = err {
            return Err(err);
        }

        let descriptor = copy_protocol_data(&buffer, bytes_returned, data)?;

        Ok(NvmeResponse {
            succeeded: Some(true),
            command_spec: Some(descriptor.protocol.fixed_return_data),
            status_field: None,
            command,
            bytes_transferred: Some(bytes_returned as usize),
            platform_header: descriptor.encode(),
        })
    }
}
