//! SDO telegram builder and parser.
//!
//! A telegram is a Modbus TCP frame carrying function 0x2B / MEI type 0x0D
//! ("CANopen general reference"). The PDU layout is:
//!
//! ```text
//! offset  size  field
//!      0     1  function (0x2B)
//!      1     1  MEI type (0x0D)
//!      2     1  rw (0 = read, 1 = write)
//!      3     3  reserved
//!      6     2  index (big-endian)
//!      8     1  subindex
//!      9     3  reserved
//!     12     1  data length
//!     13     n  data (little-endian), write requests and all responses
//! ```
//!
//! The MBAP header in front of it is big-endian, as in plain Modbus TCP.

use crate::codec::{self, Value};
use crate::od::{check_access, AccessIntent, ObjectEntry, ObjectKey};
use dryve_common::error::{DryveError, DryveResult};

/// Function code for encapsulated interface transport.
pub const FUNCTION_CODE: u8 = 0x2B;
/// MEI type selecting the CANopen general reference.
pub const MEI_TYPE: u8 = 0x0D;
/// High bit set on the function byte of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;
/// Size of the fixed PDU header preceding the data bytes.
pub const PDU_HEADER_LEN: usize = 13;
/// Largest PDU a Modbus TCP frame can carry.
pub const MAX_PDU_LEN: usize = 253;

const OFFSET_RW: usize = 2;
const OFFSET_INDEX: usize = 6;
const OFFSET_SUBINDEX: usize = 8;
const OFFSET_LENGTH: usize = 12;

/// Modbus TCP Application Protocol (MBAP) header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier (echoed by server).
    pub transaction_id: u16,
    /// Protocol identifier (0 for Modbus).
    pub protocol_id: u16,
    /// Length of remaining data (unit ID + PDU).
    pub length: u16,
    /// Unit identifier.
    pub unit_id: u8,
}

impl MbapHeader {
    /// MBAP header size in bytes.
    pub const SIZE: usize = 7;

    /// Create a header for a PDU of `pdu_length` bytes.
    pub fn new(transaction_id: u16, pdu_length: u16, unit_id: u8) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: pdu_length + 1, // +1 for unit_id
            unit_id,
        }
    }

    /// Serialize the header to bytes (big-endian).
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id;
        bytes
    }

    /// Parse a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::Framing`] if fewer than seven bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> DryveResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(DryveError::Framing(format!(
                "MBAP header too short: {} bytes",
                bytes.len()
            )));
        }

        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }

    /// Number of PDU bytes following the header.
    pub fn pdu_len(&self) -> usize {
        usize::from(self.length.saturating_sub(1))
    }
}

fn pdu_header(rw: u8, entry: &ObjectEntry, data_length: u8) -> Vec<u8> {
    let mut pdu = vec![0u8; PDU_HEADER_LEN];
    pdu[0] = FUNCTION_CODE;
    pdu[1] = MEI_TYPE;
    pdu[OFFSET_RW] = rw;
    pdu[OFFSET_INDEX..OFFSET_INDEX + 2].copy_from_slice(&entry.index.to_be_bytes());
    pdu[OFFSET_SUBINDEX] = entry.subindex;
    pdu[OFFSET_LENGTH] = data_length;
    pdu
}

/// Build the PDU of a read request for `key`.
///
/// # Errors
///
/// Returns [`DryveError::AccessViolation`] if the object is write-only.
pub fn build_read_request(key: ObjectKey) -> DryveResult<Vec<u8>> {
    let entry = key.entry();
    check_access(key, &entry, AccessIntent::Read)?;
    Ok(pdu_header(0, &entry, entry.length))
}

/// Build the PDU of a write request setting `key` to `value`.
///
/// # Errors
///
/// Returns [`DryveError::AccessViolation`] for read-only objects, a codec
/// error if the value does not fit, or [`DryveError::LengthMismatch`] if the
/// packed width disagrees with the declared object length.
pub fn build_write_request(key: ObjectKey, value: Value) -> DryveResult<Vec<u8>> {
    let entry = key.entry();
    check_access(key, &entry, AccessIntent::Write)?;

    let data = codec::pack(value, entry.data_type, entry.scale)?;
    if data.len() != usize::from(entry.length) {
        return Err(DryveError::LengthMismatch {
            expected: usize::from(entry.length),
            actual: data.len(),
        });
    }

    let mut pdu = pdu_header(1, &entry, entry.length);
    pdu.extend_from_slice(&data);
    Ok(pdu)
}

/// Fields a response must echo back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expected {
    /// Object index.
    pub index: Option<u16>,
    /// Object subindex.
    pub subindex: Option<u8>,
    /// Data length byte (checked for reads only).
    pub length: Option<u8>,
}

impl Expected {
    /// Expectations for the response to a read of `entry`.
    pub fn for_read(entry: &ObjectEntry) -> Self {
        Self {
            index: Some(entry.index),
            subindex: Some(entry.subindex),
            length: Some(entry.length),
        }
    }

    /// Expectations for the response to a write of `entry`.
    pub fn for_write(entry: &ObjectEntry) -> Self {
        Self {
            index: Some(entry.index),
            subindex: Some(entry.subindex),
            length: None,
        }
    }

    /// No echo validation.
    pub fn none() -> Self {
        Self::default()
    }
}

/// A validated response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseView<'a> {
    /// Unit identifier from the MBAP header.
    pub unit_id: u8,
    /// Complete PDU.
    pub pdu: &'a [u8],
    /// Data bytes after the fixed PDU header.
    pub data: &'a [u8],
}

/// Validate a complete response frame (MBAP header + PDU).
///
/// Checks run in a fixed order: header size, protocol id, transaction id,
/// declared length, exception flag, function echo, then the optional
/// index/subindex/length echo.
///
/// # Errors
///
/// Returns [`DryveError::Framing`], [`DryveError::TransactionMismatch`],
/// [`DryveError::ModbusException`] or [`DryveError::ResponseMismatch`] for
/// the first check that fails.
pub fn parse_response<'a>(
    frame: &'a [u8],
    expected_tid: u16,
    expected: &Expected,
) -> DryveResult<ResponseView<'a>> {
    if frame.len() < MbapHeader::SIZE + 2 {
        return Err(DryveError::Framing(format!(
            "response too short: {} bytes",
            frame.len()
        )));
    }

    let header = MbapHeader::from_bytes(frame)?;
    if header.protocol_id != 0 {
        return Err(DryveError::Framing(format!(
            "invalid protocol id: {}",
            header.protocol_id
        )));
    }

    if header.transaction_id != expected_tid {
        return Err(DryveError::TransactionMismatch {
            expected: expected_tid,
            actual: header.transaction_id,
        });
    }

    // The length field counts the unit id and the PDU.
    let remaining = frame.len() - (MbapHeader::SIZE - 1);
    if usize::from(header.length) != remaining {
        return Err(DryveError::Framing(format!(
            "declared length {} but {} bytes follow",
            header.length, remaining
        )));
    }

    let pdu = &frame[MbapHeader::SIZE..];
    if pdu[0] & EXCEPTION_FLAG != 0 {
        return Err(DryveError::ModbusException { code: pdu[1] });
    }

    if pdu[0] != FUNCTION_CODE || pdu[1] != MEI_TYPE {
        return Err(DryveError::Framing(format!(
            "unexpected function 0x{:02X}/0x{:02X}",
            pdu[0], pdu[1]
        )));
    }

    if pdu.len() < PDU_HEADER_LEN {
        return Err(DryveError::Framing(format!(
            "PDU too short: {} bytes",
            pdu.len()
        )));
    }

    let index = u16::from_be_bytes([pdu[OFFSET_INDEX], pdu[OFFSET_INDEX + 1]]);
    let subindex = pdu[OFFSET_SUBINDEX];
    let length = pdu[OFFSET_LENGTH];

    if let Some(want) = expected.index {
        if index != want {
            return Err(DryveError::ResponseMismatch {
                field: "index",
                expected: u32::from(want),
                actual: u32::from(index),
            });
        }
    }
    if let Some(want) = expected.subindex {
        if subindex != want {
            return Err(DryveError::ResponseMismatch {
                field: "subindex",
                expected: u32::from(want),
                actual: u32::from(subindex),
            });
        }
    }

    let data = &pdu[PDU_HEADER_LEN..];
    if let Some(want) = expected.length {
        if length != want {
            return Err(DryveError::ResponseMismatch {
                field: "length",
                expected: u32::from(want),
                actual: u32::from(length),
            });
        }
        if data.len() != usize::from(want) {
            return Err(DryveError::LengthMismatch {
                expected: usize::from(want),
                actual: data.len(),
            });
        }
    }

    Ok(ResponseView {
        unit_id: header.unit_id,
        pdu,
        data,
    })
}

/// Frame `pdu` with an MBAP header.
///
/// # Errors
///
/// Returns [`DryveError::Framing`] if the PDU exceeds [`MAX_PDU_LEN`].
pub fn frame_request(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> DryveResult<Vec<u8>> {
    if pdu.is_empty() || pdu.len() > MAX_PDU_LEN {
        return Err(DryveError::Framing(format!(
            "PDU length {} outside 1..={MAX_PDU_LEN}",
            pdu.len()
        )));
    }

    // Bounded by MAX_PDU_LEN above.
    #[allow(clippy::cast_possible_truncation)]
    let header = MbapHeader::new(transaction_id, pdu.len() as u16, unit_id);
    let mut frame = Vec::with_capacity(MbapHeader::SIZE + pdu.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(pdu);
    Ok(frame)
}

/// Format bytes as space-separated hex for trace logs.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
