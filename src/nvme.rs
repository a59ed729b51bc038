//! NVMe admin command and response structures.
//!
//! Layouts follow the NVMe 1.4 base specification and the Linux
//! `struct nvme_admin_cmd` passthrough ABI.

use bitfield_struct::bitfield;
use static_assertions::assert_eq_size;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U16, U32};

use crate::codec::{FieldTable, FieldValue, U128Le, WireStruct};
use crate::error::{Result, SmartError};

pub const NVME_ADMIN_GET_LOG_PAGE: u8 = 0x02;
pub const NVME_ADMIN_IDENTIFY: u8 = 0x06;

pub const NVME_LOG_SMART_INFO: u8 = 0x02;
/// CNS value selecting the Identify Controller data structure.
pub const NVME_IDENTIFY_CNS_CONTROLLER: u32 = 0x01;
/// Namespace id addressing the controller as a whole.
pub const NVME_NSID_ALL: u32 = 0xFFFF_FFFF;

/// `_IOWR('N', 0x41, struct nvme_admin_cmd)`.
pub const NVME_IOCTL_ADMIN_CMD: u32 = 0xC048_4E41;

/// An NVMe admin command in the Linux passthrough layout.
///
/// This is a host ABI structure, so its integers are in native byte order.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct AdminCommand {
    pub opcode: u8,
    pub flags: u8,
    pub rsvd1: u16,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    pub metadata: u64,
    pub addr: u64,
    pub metadata_len: u32,
    pub data_len: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    pub timeout_ms: u32,
    pub result: u32,
}

assert_eq_size!(AdminCommand, [u8; 72]);

impl WireStruct for AdminCommand {
    const NAME: &'static str = "NVMe admin command";
}

impl AdminCommand {
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            ..Default::default()
        }
    }

    /// Points the data pointer and length at `data`.
    ///
    /// The address is only meaningful while `data` stays borrowed.
    pub fn attach(&mut self, data: &mut [u8]) {
        self.addr = data.as_mut_ptr() as u64;
        self.data_len = data.len() as u32;
    }
}

/// `cdw10` for GET LOG PAGE: page id in the low half, dword count minus one
/// in the high half.
pub fn log_page_cdw10(log_page_id: u8, len: usize) -> u32 {
    let numd = ((len / 4) as u32).saturating_sub(1);
    u32::from(log_page_id) | (numd << 16)
}

/// NVMe completion queue entry status field.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct StatusField {
    pub status_code: u8,
    #[bits(3)]
    pub status_code_type: u8,
    #[bits(2)]
    pub cmd_retry_delay: u8,
    pub more: bool,
    pub do_not_retry: bool,
    #[bits(1)]
    __: u8,
}

impl StatusField {
    pub const SIZE: usize = 2;

    /// Decodes the first two bytes of `raw` as a little-endian status field.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        match raw {
            [low, high, ..] => Ok(Self::from_bits(u16::from_le_bytes([*low, *high]))),
            _ => Err(SmartError::MalformedStructure {
                structure: "NVMe status field",
                expected: Self::SIZE,
                actual: raw.len(),
            }),
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        self.into_bits().to_le_bytes()
    }
}

/// Identify Controller data structure (CNS 01h). Only the leading identity
/// fields are broken out.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IdentifyController {
    pub vendor_id: U16<LE>,
    pub ssvid: U16<LE>,
    pub serial_number: [u8; 20],
    pub model_number: [u8; 40],
    pub firmware_revision: [u8; 8],
    pub unknown: [u8; 4024],
}

assert_eq_size!(IdentifyController, [u8; 4096]);

impl WireStruct for IdentifyController {
    const NAME: &'static str = "NVMe identify controller page";
}

#[bitfield(u8)]
#[derive(PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct CriticalWarning {
    pub available_spare: bool,
    pub temperature: bool,
    pub degraded_nvm: bool,
    pub read_only: bool,
    pub volatile_memory_backup: bool,
    #[bits(3)]
    __: u8,
}

impl CriticalWarning {
    pub fn any(&self) -> bool {
        self.into_bits() & 0x1f != 0
    }
}

/// SMART / Health Information log page (02h), NVMe 1.4 figure 194.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SmartLog {
    pub critical_warning: CriticalWarning,
    /// Composite temperature in Kelvin.
    pub temperature: U16<LE>,
    pub available_spare: u8,
    pub available_spare_threshold: u8,
    pub percent_used: u8,
    pub endurance_group_critical_warning_summary: u8,
    pub rsvd1: [u8; 25],
    /// 512-byte data units read, in thousands.
    pub data_units_read: U128Le,
    /// 512-byte data units written, in thousands.
    pub data_units_written: U128Le,
    pub host_read_commands: U128Le,
    pub host_write_commands: U128Le,
    pub controller_busy_time: U128Le,
    pub power_cycles: U128Le,
    pub power_on_hours: U128Le,
    pub unsafe_shutdowns: U128Le,
    pub media_errors: U128Le,
    pub num_err_log_entries: U128Le,
    pub warning_temp_time: U32<LE>,
    pub critical_temp_time: U32<LE>,
    pub temperature_sensors: [U16<LE>; 8],
    pub thermal_transition_counts: [U32<LE>; 2],
    pub total_time_for_thermal_management: [U32<LE>; 2],
    pub rsvd2: [u8; 280],
}

assert_eq_size!(SmartLog, [u8; 512]);

impl WireStruct for SmartLog {
    const NAME: &'static str = "NVMe SMART log page";
}

impl FieldTable for SmartLog {
    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let cw = self.critical_warning;
        let int = FieldValue::Unsigned;
        vec![
            ("critical_warning.available_spare", FieldValue::Flag(cw.available_spare())),
            ("critical_warning.temperature", FieldValue::Flag(cw.temperature())),
            ("critical_warning.degraded_nvm", FieldValue::Flag(cw.degraded_nvm())),
            ("critical_warning.read_only", FieldValue::Flag(cw.read_only())),
            (
                "critical_warning.volatile_memory_backup",
                FieldValue::Flag(cw.volatile_memory_backup()),
            ),
            ("temperature", int(self.temperature.get().into())),
            ("available_spare", int(self.available_spare.into())),
            ("available_spare_threshold", int(self.available_spare_threshold.into())),
            ("percent_used", int(self.percent_used.into())),
            (
                "endurance_group_critical_warning_summary",
                int(self.endurance_group_critical_warning_summary.into()),
            ),
            ("data_units_read", int(self.data_units_read.get())),
            ("data_units_written", int(self.data_units_written.get())),
            ("host_read_commands", int(self.host_read_commands.get())),
            ("host_write_commands", int(self.host_write_commands.get())),
            ("controller_busy_time", int(self.controller_busy_time.get())),
            ("power_cycles", int(self.power_cycles.get())),
            ("power_on_hours", int(self.power_on_hours.get())),
            ("unsafe_shutdowns", int(self.unsafe_shutdowns.get())),
            ("media_errors", int(self.media_errors.get())),
            ("num_err_log_entries", int(self.num_err_log_entries.get())),
            ("warning_temp_time", int(self.warning_temp_time.get().into())),
            ("critical_temp_time", int(self.critical_temp_time.get().into())),
            (
                "temperature_sensors",
                FieldValue::List(self.temperature_sensors.iter().map(|t| t.get().into()).collect()),
            ),
            (
                "thermal_transition_counts",
                FieldValue::List(
                    self.thermal_transition_counts.iter().map(|c| c.get().into()).collect(),
                ),
            ),
            (
                "total_time_for_thermal_management",
                FieldValue::List(
                    self.total_time_for_thermal_management
                        .iter()
                        .map(|c| c.get().into())
                        .collect(),
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use zerocopy::FromZeros;

    use super::*;

    #[test]
    fn identify_command_round_trips() {
        let mut cmd = AdminCommand::new(NVME_ADMIN_IDENTIFY);
        cmd.cdw10 = NVME_IDENTIFY_CNS_CONTROLLER;
        let bytes = cmd.encode();
        assert_eq!(bytes.len(), 72);
        assert_eq!(bytes[0], 0x06);
        assert_eq!(AdminCommand::decode(&bytes).unwrap(), cmd);
    }

    #[test]
    fn admin_command_field_offsets() {
        assert_eq!(offset_of!(AdminCommand, nsid), 4);
        assert_eq!(offset_of!(AdminCommand, metadata), 16);
        assert_eq!(offset_of!(AdminCommand, addr), 24);
        assert_eq!(offset_of!(AdminCommand, data_len), 36);
        assert_eq!(offset_of!(AdminCommand, cdw10), 40);
        assert_eq!(offset_of!(AdminCommand, timeout_ms), 64);
        assert_eq!(offset_of!(AdminCommand, result), 68);
    }

    #[test]
    fn short_input_is_malformed() {
        let err = AdminCommand::decode(&[0u8; 40]).unwrap_err();
        assert!(matches!(
            err,
            SmartError::MalformedStructure { expected: 72, actual: 40, .. }
        ));
        assert!(StatusField::decode(&[0x01]).is_err());
    }

    #[test]
    fn ioctl_number_encodes_command_size() {
        assert_eq!((NVME_IOCTL_ADMIN_CMD >> 16) & 0x3fff, 72);
        assert_eq!((NVME_IOCTL_ADMIN_CMD >> 8) & 0xff, u32::from(b'N'));
    }

    #[test]
    fn status_field_bits_are_lsb_first() {
        // sc=0x02, sct=1, crd=2, more=1, dnr=1
        let field = StatusField::decode(&[0x02, 0b0111_0001]).unwrap();
        assert_eq!(field.status_code(), 2);
        assert_eq!(field.status_code_type(), 1);
        assert_eq!(field.cmd_retry_delay(), 2);
        assert!(field.more());
        assert!(field.do_not_retry());
        assert_eq!(field.encode(), [0x02, 0b0111_0001]);
    }

    #[test]
    fn log_page_dword_count() {
        assert_eq!(log_page_cdw10(0x02, 512), 0x007F_0002);
        assert_eq!(log_page_cdw10(0x01, 4096), 0x03FF_0001);
        assert_eq!(log_page_cdw10(0x05, 2), 0x0000_0005);
    }

    #[test]
    fn smart_log_offsets() {
        assert_eq!(offset_of!(SmartLog, temperature), 1);
        assert_eq!(offset_of!(SmartLog, data_units_read), 32);
        assert_eq!(offset_of!(SmartLog, num_err_log_entries), 176);
        assert_eq!(offset_of!(SmartLog, warning_temp_time), 192);
        assert_eq!(offset_of!(SmartLog, temperature_sensors), 200);
        assert_eq!(offset_of!(SmartLog, rsvd2), 232);
    }

    #[test]
    fn smart_log_decodes_little_endian_fields() {
        let mut raw = [0u8; 512];
        raw[0] = 0b0000_0110;
        raw[1..3].copy_from_slice(&300u16.to_le_bytes());
        raw[5] = 7;
        raw[128..136].copy_from_slice(&1234u64.to_le_bytes());
        let log = SmartLog::decode(&raw).unwrap();
        assert!(log.critical_warning.temperature());
        assert!(log.critical_warning.degraded_nvm());
        assert!(!log.critical_warning.available_spare());
        assert_eq!(log.temperature.get(), 300);
        assert_eq!(log.percent_used, 7);
        assert_eq!(log.power_on_hours.get(), 1234);
    }

    #[test]
    fn smart_table_skips_reserved_regions() {
        let log = SmartLog::new_zeroed();
        let names: Vec<_> = log.fields().into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&"power_on_hours"));
        assert!(!names.iter().any(|n| n.starts_with("rsvd")));
        assert_eq!(names.len(), 25);
    }
}
