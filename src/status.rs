//! Interpretation of NVMe completion status.

use log::warn;

use crate::error::{Result, SmartError};
use crate::nvme::{AdminCommand, StatusField};

/// Decodes the leading status field of `raw` and fails unless both the
/// status code and the status code type are zero.
pub fn parse_status_field(raw: &[u8]) -> Result<StatusField> {
    let field = StatusField::decode(raw)?;
    if field.status_code() != 0 || field.status_code_type() != 0 {
        warn!(
            "NVMe status failure: sc={:#04x} sct={} dnr={}",
            field.status_code(),
            field.status_code_type(),
            field.do_not_retry()
        );
        return Err(SmartError::StatusField {
            code: field.status_code(),
            code_type: field.status_code_type(),
            field,
        });
    }
    Ok(field)
}

/// Interprets the return value of the Linux NVMe admin ioctl. A positive
/// value is the completion status field with the phase bit stripped.
pub fn completion_status(ret: i32) -> Result<StatusField> {
    parse_status_field(&(ret as u16).to_le_bytes())
}

/// Outcome of one admin command, independent of the platform that issued it.
#[derive(Debug, Clone)]
pub struct NvmeResponse {
    /// `None` when the platform cannot tell.
    pub succeeded: Option<bool>,
    /// Command specific dword 0 of the completion.
    pub command_spec: Option<u32>,
    pub status_field: Option<StatusField>,
    pub command: AdminCommand,
    pub bytes_transferred: Option<usize>,
    /// Raw bytes of the platform structure the command travelled in.
    pub platform_header: Vec<u8>,
}

impl NvmeResponse {
    pub fn is_success(&self) -> bool {
        self.succeeded == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_status_is_success() {
        let field = parse_status_field(&[0x00, 0x00]).unwrap();
        assert_eq!(field.status_code(), 0);
        assert_eq!(field.status_code_type(), 0);
        assert!(!field.do_not_retry());
    }

    #[test]
    fn nonzero_code_and_type_fail() {
        let raw = StatusField::new()
            .with_status_code(2)
            .with_status_code_type(1)
            .encode();
        match parse_status_field(&raw) {
            Err(SmartError::StatusField { code, code_type, field }) => {
                assert_eq!((code, code_type), (2, 1));
                assert_eq!(field.status_code(), 2);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn either_field_alone_fails() {
        assert!(parse_status_field(&[0x00, 0x01]).is_err());
        assert!(parse_status_field(&[0x0b, 0x00]).is_err());
    }

    #[test]
    fn retry_bits_alone_do_not_fail() {
        let field = parse_status_field(&[0x00, 0b0100_0000]).unwrap();
        assert!(field.do_not_retry());
    }

    #[test]
    fn ioctl_return_zero_is_success() {
        let field = completion_status(0).unwrap();
        assert_eq!(field.into_bits(), 0);
    }

    #[test]
    fn ioctl_return_carries_status_field() {
        // sc=0x02, sct=1, dnr set
        match completion_status(0x4102) {
            Err(SmartError::StatusField { code, code_type, field }) => {
                assert_eq!((code, code_type), (2, 1));
                assert!(field.do_not_retry());
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn only_first_two_bytes_are_read() {
        assert!(parse_status_field(&[0x00, 0x00, 0xff, 0xff]).is_ok());
        assert!(matches!(
            parse_status_field(&[]),
            Err(SmartError::MalformedStructure { .. })
        ));
    }
}
