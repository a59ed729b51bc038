use std::ffi::{c_int, c_uchar, c_uint, c_ushort, c_void};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::null_mut;

use log::debug;
use nix::fcntl::OFlag;

use crate::codec::WireStruct;
use crate::device::{Device, DeviceHandle, NvmeDevice};
use crate::error::{Result, SmartError};
use crate::nvme::{AdminCommand, StatusField};
use crate::scsi::{CommandBlock, Direction, ScsiDevice, Sense, SENSE_SIZE};
use crate::status::{completion_status, NvmeResponse};

nix::ioctl_readwrite!(nvme_admin_cmd, b'N', 0x41, AdminCommand);

const SG_IO: c_uint = 0x2285;
const SG_INTERFACE_ID: c_int = b'S' as c_int;
const SG_DXFER_NONE: c_int = -1;
const SG_DXFER_TO_DEV: c_int = -2;
const SG_DXFER_FROM_DEV: c_int = -3;

/// `struct sg_io_hdr` from `<scsi/sg.h>`.
#[repr(C)]
struct SgIoHdr {
    interface_id: c_int,
    dxfer_direction: c_int,
    cmd_len: c_uchar,
    mx_sb_len: c_uchar,
    iovec_count: c_ushort,
    dxfer_len: c_uint,
    dxferp: *mut c_void,
    cmdp: *mut c_uchar,
    sbp: *mut c_uchar,
    timeout: c_uint,
    flags: c_uint,
    pack_id: c_int,
    usr_ptr: *mut c_void,
    status: c_uchar,
    masked_status: c_uchar,
    msg_status: c_uchar,
    sb_len_wr: c_uchar,
    host_status: c_ushort,
    driver_status: c_ushort,
    resid: c_int,
    duration: c_uint,
    info: c_uint,
}

nix::ioctl_readwrite_bad!(sg_io, SG_IO, SgIoHdr);

/// Opens a device node read/write without blocking on media presence.
fn open_raw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
        .map_err(SmartError::Platform)
}

/// An NVMe controller character device such as `/dev/nvme0`.
#[derive(Debug)]
pub struct LinuxNvmeDevice {
    handle: DeviceHandle<File>,
}

impl LinuxNvmeDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            handle: DeviceHandle::new(path),
        }
    }
}

impl Device for LinuxNvmeDevice {
    fn path(&self) -> &Path {
        self.handle.path()
    }

    fn open(&mut self) -> Result<()> {
        self.handle.open_with(open_raw)
    }

    fn close(&mut self) {
        self.handle.close();
    }

    fn is_open(&self) -> bool {
        self.handle.is_open()
    }
}

impl NvmeDevice for LinuxNvmeDevice {
    fn issue_admin_command(
        &mut self,
        mut command: AdminCommand,
        data: &mut [u8],
    ) -> Result<NvmeResponse> {
        let fd = self.handle.get()?.as_raw_fd();
        command.attach(data);
        debug!(
            "{}: admin opcode={:#04x} nsid={:#x} cdw10={:#010x} len={}",
            self.handle.path().display(),
            command.opcode,
            command.nsid,
            command.cdw10,
            command.data_len
        );

        let status = unsafe { nvme_admin_cmd(fd, &mut command) }?;
        let status_field = completion_status(status)?;

        Ok(admin_response(command, status_field))
    }
}

/// The ioctl reports no transfer count, only the result dword and status.
fn admin_response(command: AdminCommand, status_field: StatusField) -> NvmeResponse {
    NvmeResponse {
        succeeded: Some(true),
        command_spec: Some(command.result),
        status_field: Some(status_field),
        command,
        bytes_transferred: None,
        platform_header: command.encode(),
    }
}

/// A SCSI generic capable block or `sg` device, driven through `SG_IO`.
#[derive(Debug)]
pub struct LinuxScsiDevice {
    handle: DeviceHandle<File>,
}

impl LinuxScsiDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            handle: DeviceHandle::new(path),
        }
    }
}

impl Device for LinuxScsiDevice {
    fn path(&self) -> &Path {
        self.handle.path()
    }

    fn open(&mut self) -> Result<()> {
        self.handle.open_with(open_raw)
    }

    fn close(&mut self) {
        self.handle.close();
    }

    fn is_open(&self) -> bool {
        self.handle.is_open()
    }
}

impl ScsiDevice for LinuxScsiDevice {
    fn issue_command(
        &mut self,
        direction: Direction,
        command: &[u8],
        data: &mut [u8],
        timeout_ms: u32,
    ) -> Result<Sense> {
        let fd = self.handle.get()?.as_raw_fd();
        let cdb = CommandBlock::new(command)?;
        let mut sense: Sense = [0; SENSE_SIZE];
        debug!(
            "{}: scsi cdb={:02x?} dir={:?} len={}",
            self.handle.path().display(),
            &cdb.bytes()[..usize::from(cdb.len())],
            direction,
            data.len()
        );

        let mut hdr = SgIoHdr {
            interface_id: SG_INTERFACE_ID,
            dxfer_direction: match direction {
                Direction::To => SG_DXFER_TO_DEV,
                Direction::From => SG_DXFER_FROM_DEV,
                Direction::None => SG_DXFER_NONE,
            },
            cmd_len: cdb.len(),
            mx_sb_len: SENSE_SIZE as c_uchar,
            iovec_count: 0,
            dxfer_len: data.len() as c_uint,
            dxferp: data.as_mut_ptr().cast(),
            cmdp: cdb.bytes().as_ptr().cast_mut(),
            sbp: sense.as_mut_ptr(),
            timeout: timeout_ms,
            flags: 0,
            pack_id: 0,
            usr_ptr: null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };

        let result = unsafe { sg_io(fd, &mut hdr) };
        self.inspect_sense(&sense);
        result?;
        Ok(sense)
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;
    use crate::nvme::NVME_IOCTL_ADMIN_CMD;

    #[test]
    fn admin_ioctl_request_code_matches_abi() {
        let code = nix::request_code_readwrite!(b'N', 0x41, size_of::<AdminCommand>());
        assert_eq!(code as u32, NVME_IOCTL_ADMIN_CMD);
    }

    #[test]
    fn admin_response_has_no_transfer_count() {
        let mut command = AdminCommand::new(0x06);
        command.result = 0x55;
        let response = admin_response(command, StatusField::new());
        assert!(response.is_success());
        assert_eq!(response.command_spec, Some(0x55));
        assert_eq!(response.bytes_transferred, None);
        assert_eq!(response.platform_header.len(), 72);
    }

    #[test]
    fn sg_io_header_matches_kernel_layout() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(size_of::<SgIoHdr>(), 88);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(size_of::<SgIoHdr>(), 64);
    }
}
