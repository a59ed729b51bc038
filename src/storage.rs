//! `IOCTL_STORAGE_QUERY_PROPERTY` protocol-specific structures.
//!
//! Windows exposes NVMe admin data through these instead of a raw
//! passthrough. They are plain byte layouts, so parsing is host independent.

use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::codec::WireStruct;
use crate::error::{Result, SmartError};

/// `STORAGE_PROTOCOL_SPECIFIC_DATA`.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ProtocolSpecificData {
    pub protocol_type: u32,
    pub data_type: u32,
    pub request_value: u32,
    pub request_sub_value: u32,
    /// Relative to the start of this structure.
    pub data_offset: u32,
    pub data_length: u32,
    pub fixed_return_data: u32,
    pub request_sub_value2: u32,
    pub request_sub_value3: u32,
    pub request_sub_value4: u32,
}

/// `STORAGE_PROPERTY_QUERY` with its protocol block in `AdditionalParameters`.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ProtocolQuery {
    pub property_id: u32,
    pub query_type: u32,
    pub protocol: ProtocolSpecificData,
}

/// `STORAGE_PROTOCOL_DATA_DESCRIPTOR`.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ProtocolDataDescriptor {
    pub version: u32,
    pub size: u32,
    pub protocol: ProtocolSpecificData,
}

static_assertions::assert_eq_size!(ProtocolSpecificData, [u8; 40]);
static_assertions::assert_eq_size!(ProtocolQuery, [u8; 48]);
static_assertions::assert_eq_size!(ProtocolDataDescriptor, [u8; 48]);

impl WireStruct for ProtocolDataDescriptor {
    const NAME: &'static str = "storage protocol data descriptor";
}

/// Validates the descriptor at the start of `buffer` and copies the protocol
/// data it points at into `data`, clamped to `data.len()`.
pub fn copy_protocol_data(
    buffer: &[u8],
    bytes_returned: u32,
    data: &mut [u8],
) -> Result<ProtocolDataDescriptor> {
    let returned = &buffer[..(bytes_returned as usize).min(buffer.len())];
    let descriptor = ProtocolDataDescriptor::decode(returned)?;

    let descriptor_len = size_of::<ProtocolDataDescriptor>();
    if descriptor.version as usize != descriptor_len || descriptor.size as usize != descriptor_len {
        return Err(SmartError::MalformedStructure {
            structure: ProtocolDataDescriptor::NAME,
            expected: descriptor_len,
            actual: descriptor.size as usize,
        });
    }

    let start = size_of::<u32>() * 2 + descriptor.protocol.data_offset as usize;
    let len = (descriptor.protocol.data_length as usize).min(data.len());
    let payload = start
        .checked_add(len)
        .and_then(|end| buffer.get(start..end))
        .ok_or(SmartError::MalformedStructure {
            structure: ProtocolDataDescriptor::NAME,
            expected: start.saturating_add(len),
            actual: buffer.len(),
        })?;
    data[..len].copy_from_slice(payload);
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use zerocopy::FromZeros;

    use super::*;

    const DATA_OFFSET: u32 = size_of::<ProtocolSpecificData>() as u32;

    fn reply(version: u32, data_offset: u32, payload: &[u8]) -> Vec<u8> {
        let mut descriptor = ProtocolDataDescriptor::new_zeroed();
        descriptor.version = version;
        descriptor.size = 48;
        descriptor.protocol.data_offset = data_offset;
        descriptor.protocol.data_length = payload.len() as u32;
        descriptor.protocol.fixed_return_data = 0xabcd;
        let mut buffer = descriptor.encode();
        buffer.extend_from_slice(payload);
        buffer
    }

    #[test]
    fn payload_follows_the_protocol_block() {
        let buffer = reply(48, DATA_OFFSET, b"SMARTDATA");
        let mut data = [0u8; 9];
        let descriptor = copy_protocol_data(&buffer, buffer.len() as u32, &mut data).unwrap();
        assert_eq!(&data, b"SMARTDATA");
        assert_eq!(descriptor.protocol.fixed_return_data, 0xabcd);
    }

    #[test]
    fn payload_is_clamped_to_the_destination() {
        let buffer = reply(48, DATA_OFFSET, b"0123456789");
        let mut data = [0u8; 4];
        copy_protocol_data(&buffer, buffer.len() as u32, &mut data).unwrap();
        assert_eq!(&data, b"0123");
    }

    #[test]
    fn wrong_descriptor_version_is_malformed() {
        let buffer = reply(40, DATA_OFFSET, &[1, 2, 3, 4]);
        let mut data = [0u8; 4];
        assert!(matches!(
            copy_protocol_data(&buffer, buffer.len() as u32, &mut data),
            Err(SmartError::MalformedStructure { expected: 48, .. })
        ));
    }

    #[test]
    fn offset_past_the_buffer_is_malformed() {
        let buffer = reply(48, 4096, &[1, 2, 3, 4]);
        let mut data = [0u8; 4];
        assert!(matches!(
            copy_protocol_data(&buffer, buffer.len() as u32, &mut data),
            Err(SmartError::MalformedStructure { .. })
        ));
        assert!(matches!(
            copy_protocol_data(&buffer, u32::MAX, &mut data),
            Err(SmartError::MalformedStructure { .. })
        ));
    }

    #[test]
    fn short_reply_is_malformed() {
        let mut data = [0u8; 4];
        assert!(matches!(
            copy_protocol_data(&[0u8; 48], 20, &mut data),
            Err(SmartError::MalformedStructure { expected: 48, actual: 20, .. })
        ));
    }
}
