//! Frame construction and response parsing for the register protocol.
//!
//! Everything in this module is pure: bytes in, outcome out. No I/O,
//! no logging, no retries. The exchange layer in [`crate::RegisterClient`]
//! owns all of that, which keeps this layer trivial to property test.

pub mod read_message;
pub mod write_message;

use crc16::{State, MODBUS};

/// Every protocol frame starts with this byte.
pub const PREAMBLE: u8 = 0xAA;

/// A reply longer than this cannot be a bare protocol frame. The firmware
/// shares its UART with a debug console and sometimes interleaves log text
/// with protocol bytes, so oversized buffers are scanned for an embedded
/// frame instead of being rejected outright.
pub const NOISE_THRESHOLD: usize = 100;

/// Compute the CRC check value for the given bytes
pub fn crc16(data: &[u8]) -> u16 {
    State::<MODBUS>::calculate(data)
}

/// The result of one register exchange, as reported by the device.
///
/// Transport failures are not represented here; they surface as errors
/// from the exchange itself. Everything the device (or the wire) can say
/// comes back as one of these.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ResponseOutcome {
    /// A read succeeded; the register held this value.
    Value(u16),
    /// A write was accepted.
    Ack,
    /// The device refused the request.
    Nack(ErrorCode),
    /// The reply did not form a valid frame.
    Malformed(FrameFault),
    /// No reply arrived within the wait window.
    Timeout,
}

/// Error codes the device reports in a NACK frame.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorCode {
    InvalidAddress,
    ReadOnly,
    OutOfRange,
    CrcError,
    Unknown,
}

impl ErrorCode {
    pub(crate) fn from_byte(code: u8) -> Self {
        match code {
            0x01 => Self::InvalidAddress,
            0x02 => Self::ReadOnly,
            0x03 => Self::OutOfRange,
            0x04 => Self::CrcError,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::InvalidAddress => "invalid register address",
            Self::ReadOnly => "register is read only",
            Self::OutOfRange => "value out of range",
            Self::CrcError => "device reports a CRC error in the request",
            Self::Unknown => "unknown error",
        };
        write!(f, "{text}")
    }
}

/// Why a reply failed to parse. Carried inside
/// [`ResponseOutcome::Malformed`] for diagnostics; callers that only care
/// about success can match on the outer variant alone.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FrameFault {
    /// An oversized buffer contained no recognizable frame start.
    NoSignature,
    /// The reply does not start like any frame this transaction can produce.
    BadHeader,
    /// A frame start was present but the buffer ended before the frame did.
    Truncated,
    /// The frame layout was right but the CRC trailer did not match.
    CrcMismatch,
}

impl std::fmt::Display for FrameFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoSignature => "no frame signature found in the reply",
            Self::BadHeader => "reply does not start with a valid frame header",
            Self::Truncated => "reply ended before the frame did",
            Self::CrcMismatch => "CRC check failed",
        };
        write!(f, "{text}")
    }
}

/// Search an oversized buffer for an embedded frame.
///
/// `accept` decides whether the byte following a preamble can start a frame
/// for the current transaction. On a hit, a window of up to `window` bytes
/// starting at the signature (clamped at the buffer end) is handed back for
/// normal parsing. The first plausible signature wins.
pub(crate) fn recover_frame(raw: &[u8], window: usize, accept: impl Fn(u8) -> bool) -> Option<&[u8]> {
    raw.windows(2)
        .position(|pair| pair[0] == PREAMBLE && accept(pair[1]))
        .map(|start| &raw[start..raw.len().min(start + window)])
}

#[test]
fn test_crc16_known_vectors() {
    // The classic MODBUS request 01 03 00 00 00 01 carries check bytes 84 0A
    assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
    assert_eq!(crc16(&hex::decode("aa09025701").unwrap()), 0xB461);
    assert_eq!(crc16(&[]), 0xFFFF);
}

#[test]
fn test_error_code_from_byte() {
    assert_eq!(ErrorCode::from_byte(0x01), ErrorCode::InvalidAddress);
    assert_eq!(ErrorCode::from_byte(0x02), ErrorCode::ReadOnly);
    assert_eq!(ErrorCode::from_byte(0x03), ErrorCode::OutOfRange);
    assert_eq!(ErrorCode::from_byte(0x04), ErrorCode::CrcError);
    assert_eq!(ErrorCode::from_byte(0xFF), ErrorCode::Unknown);
    assert_eq!(ErrorCode::from_byte(0x42), ErrorCode::Unknown);
}

#[test]
fn test_recover_frame_finds_first_signature() {
    let mut raw = vec![0x20u8; 60];
    raw[10] = PREAMBLE;
    raw[11] = 0x09;
    raw[30] = PREAMBLE;
    raw[31] = 0x09;
    let frame = recover_frame(&raw, 9, |b| b == 0x09).unwrap();
    assert_eq!(frame.len(), 9);
    assert_eq!(frame[0], PREAMBLE);
    assert_eq!(&raw[10..19], frame);
}

#[test]
fn test_recover_frame_clamps_window_at_buffer_end() {
    let mut raw = vec![0x20u8; 20];
    raw[17] = PREAMBLE;
    raw[18] = 0x09;
    let frame = recover_frame(&raw, 9, |b| b == 0x09).unwrap();
    assert_eq!(frame, &[PREAMBLE, 0x09, 0x20]);
}

#[test]
fn test_recover_frame_rejects_unaccepted_command() {
    let mut raw = vec![0x20u8; 20];
    raw[5] = PREAMBLE;
    raw[6] = 0x0D;
    assert_eq!(recover_frame(&raw, 9, |b| b == 0x09), None);
}
