//! SCSI command blocks and the Windows `SCSI_PASS_THROUGH_DIRECT` header.

use std::mem::{offset_of, size_of};

use log::trace;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::codec::WireStruct;
use crate::device::Device;
use crate::error::{Result, SmartError};

pub const CDB_SIZE: usize = 16;
pub const SENSE_SIZE: usize = 32;
/// Timeout callers should pass to [`ScsiDevice::issue_command`] unless a
/// command needs longer.
pub const DEFAULT_SCSI_TIMEOUT_MS: u32 = 3000;

/// `CTL_CODE(IOCTL_SCSI_BASE, 0x0405, METHOD_BUFFERED, FILE_READ_ACCESS | FILE_WRITE_ACCESS)`.
pub const IOCTL_SCSI_PASS_THROUGH_DIRECT: u32 = 0x4D014;

pub type Sense = [u8; SENSE_SIZE];

/// Direction of the data phase, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    To,
    /// Device to host.
    From,
    /// No data phase.
    None,
}

impl Direction {
    /// `SCSI_IOCTL_DATA_OUT` / `SCSI_IOCTL_DATA_IN` / `SCSI_IOCTL_DATA_UNSPECIFIED`.
    pub fn data_in_flag(self) -> u8 {
        match self {
            Direction::To => 0,
            Direction::From => 1,
            Direction::None => 2,
        }
    }
}

/// A CDB right-padded with zeros to [`CDB_SIZE`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBlock {
    bytes: [u8; CDB_SIZE],
    len: u8,
}

impl CommandBlock {
    pub fn new(command: &[u8]) -> Result<Self> {
        if command.len() > CDB_SIZE {
            return Err(SmartError::CommandTooLong {
                len: command.len(),
                max: CDB_SIZE,
            });
        }
        let mut bytes = [0u8; CDB_SIZE];
        bytes[..command.len()].copy_from_slice(command);
        Ok(Self {
            bytes,
            len: command.len() as u8,
        })
    }

    pub fn bytes(&self) -> &[u8; CDB_SIZE] {
        &self.bytes
    }

    /// Length of the command as given, before padding.
    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ScsiPassThroughDirect {
    pub length: u16,
    pub scsi_status: u8,
    pub path_id: u8,
    pub target_id: u8,
    pub lun: u8,
    pub cdb_length: u8,
    pub sense_info_length: u8,
    pub data_in: u8,
    _pad0: [u8; 3],
    pub data_transfer_length: u32,
    pub timeout_value: u32,
    #[cfg(target_pointer_width = "64")]
    _pad1: u32,
    pub data_buffer: usize,
    pub sense_info_offset: u32,
    pub cdb: [u8; CDB_SIZE],
    #[cfg(target_pointer_width = "64")]
    _pad2: u32,
}

/// The header followed by its sense buffer, submitted and returned in place.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ScsiPassThroughDirectWithBuffer {
    pub sptd: ScsiPassThroughDirect,
    pub filler: u32,
    pub sense: Sense,
    #[cfg(target_pointer_width = "64")]
    _pad: u32,
}

#[cfg(target_pointer_width = "64")]
static_assertions::assert_eq_size!(ScsiPassThroughDirect, [u8; 56]);
#[cfg(target_pointer_width = "64")]
static_assertions::assert_eq_size!(ScsiPassThroughDirectWithBuffer, [u8; 96]);
#[cfg(target_pointer_width = "32")]
static_assertions::assert_eq_size!(ScsiPassThroughDirect, [u8; 44]);

impl WireStruct for ScsiPassThroughDirectWithBuffer {
    const NAME: &'static str = "SCSI pass-through header";
}

impl ScsiPassThroughDirectWithBuffer {
    /// Builds the header for one command. `data` must outlive the ioctl.
    pub fn new(direction: Direction, cdb: &CommandBlock, data: &mut [u8], timeout_ms: u32) -> Self {
        Self {
            sptd: ScsiPassThroughDirect {
                length: size_of::<ScsiPassThroughDirect>() as u16,
                scsi_status: 0,
                path_id: 0,
                target_id: 0,
                lun: 0,
                cdb_length: cdb.len(),
                sense_info_length: SENSE_SIZE as u8,
                data_in: direction.data_in_flag(),
                _pad0: [0; 3],
                data_transfer_length: data.len() as u32,
                timeout_value: timeout_ms,
                #[cfg(target_pointer_width = "64")]
                _pad1: 0,
                data_buffer: data.as_mut_ptr() as usize,
                sense_info_offset: offset_of!(ScsiPassThroughDirectWithBuffer, sense) as u32,
                cdb: *cdb.bytes(),
                #[cfg(target_pointer_width = "64")]
                _pad2: 0,
            },
            filler: 0,
            sense: [0; SENSE_SIZE],
            #[cfg(target_pointer_width = "64")]
            _pad: 0,
        }
    }
}

/// A device that accepts raw SCSI command blocks.
pub trait ScsiDevice: Device {
    /// Sends `command` with `data` as the transfer buffer and returns the raw
    /// sense bytes. Sense data is not interpreted here.
    fn issue_command(
        &mut self,
        direction: Direction,
        command: &[u8],
        data: &mut [u8],
        timeout_ms: u32,
    ) -> Result<Sense>;

    /// Called with the sense buffer of every submitted command, whether or
    /// not the OS call succeeded.
    fn inspect_sense(&self, sense: &[u8]) {
        if sense.iter().any(|&b| b != 0) {
            trace!("sense: {sense:02x?}");
        }
    }
}
