//! The write-register transaction: command `0x0D`, reply is a short ACK
//! or NACK frame.

use super::{crc16, recover_frame, ErrorCode, FrameFault, ResponseOutcome, NOISE_THRESHOLD, PREAMBLE};

/// Command byte of a register write.
pub (crate) const COMMAND: u8 = 0x0D;
/// Payload length byte of a write request: address plus value.
const REQUEST_PAYLOAD_LEN: u8 = 0x04;
/// ACK and NACK replies fit in this window, which is also the slice taken
/// out of a noisy buffer during frame recovery.
pub (crate) const RESPONSE_LEN: usize = 5;

/// Second byte of an accepting reply.
const ACK: u8 = 0x01;
/// Second byte of a refusing reply.
const NACK: u8 = 0x00;

/// Build the request frame for writing one register.
///
/// Start Byte | End Byte | Meaning
/// 0          | 0        | Preamble 0xAA
/// 1          | 1        | Command 0x0D
/// 2          | 2        | Payload length 0x04
/// 3          | 4        | Register address, LSB first
/// 5          | 6        | Value to store, LSB first
/// 7          | 8        | MODBUS CRC over bytes 0-6, LSB first
pub fn request(address: u16, value: u16) -> [u8; 9] {
    let [addr_lsb, addr_msb] = address.to_le_bytes();
    let [val_lsb, val_msb] = value.to_le_bytes();
    let mut frame = [
        PREAMBLE,
        COMMAND,
        REQUEST_PAYLOAD_LEN,
        addr_lsb,
        addr_msb,
        val_lsb,
        val_msb,
        0,
        0,
    ];
    let crc = crc16(&frame[..7]).to_le_bytes();
    frame[7] = crc[0];
    frame[8] = crc[1];
    frame
}

/// Decode the reply to a write request.
///
/// The device answers `[0xAA, 0x01]` to accept the write and
/// `[0xAA, 0x00, code]` to refuse it. An empty buffer reports
/// [`ResponseOutcome::Timeout`]; a buffer longer than [`NOISE_THRESHOLD`]
/// is scanned for either signature before giving up.
pub fn parse(raw: &[u8]) -> ResponseOutcome {
    if raw.is_empty() {
        return ResponseOutcome::Timeout;
    }

    let buffer = if raw.len() > NOISE_THRESHOLD {
        match recover_frame(raw, RESPONSE_LEN, |b| b == ACK || b == NACK) {
            Some(frame) => frame,
            None => return ResponseOutcome::Malformed(FrameFault::NoSignature),
        }
    } else {
        raw
    };

    if buffer.len() < 2 {
        return ResponseOutcome::Malformed(FrameFault::Truncated);
    }
    if buffer[0] != PREAMBLE {
        return ResponseOutcome::Malformed(FrameFault::BadHeader);
    }

    match buffer[1] {
        ACK => ResponseOutcome::Ack,
        NACK => {
            let code = buffer
                .get(2)
                .copied()
                .map(ErrorCode::from_byte)
                .unwrap_or(ErrorCode::Unknown);
            ResponseOutcome::Nack(code)
        }
        _ => ResponseOutcome::Malformed(FrameFault::BadHeader),
    }
}

#[test]
fn test_request_known_frame() {
    let frame = request(0x012c, 4200);
    assert_eq!(frame.to_vec(), hex::decode("aa0d042c016810968b").unwrap());
}

#[test]
fn test_request_crc_covers_header_and_payload() {
    for (address, value) in [(0x0000u16, 0u16), (0x012c, 4200), (0x0157, 0xffff), (0xffff, 1)] {
        let frame = request(address, value);
        assert_eq!(frame.len(), 9);
        assert_eq!(frame[0], 0xaa);
        assert_eq!(frame[1], 0x0d);
        assert_eq!(frame[2], 0x04);
        assert_eq!(u16::from_le_bytes([frame[3], frame[4]]), address);
        assert_eq!(u16::from_le_bytes([frame[5], frame[6]]), value);
        assert_eq!(frame[7..], crc16(&frame[..7]).to_le_bytes());
    }
}

#[test]
fn test_parse_ack() {
    assert_eq!(parse(&[0xaa, 0x01]), ResponseOutcome::Ack);
}

#[test]
fn test_parse_nack_out_of_range() {
    assert_eq!(parse(&[0xaa, 0x00, 0x03]), ResponseOutcome::Nack(ErrorCode::OutOfRange));
}

#[test]
fn test_parse_nack_without_code() {
    assert_eq!(parse(&[0xaa, 0x00]), ResponseOutcome::Nack(ErrorCode::Unknown));
}

#[test]
fn test_parse_empty_is_timeout() {
    assert_eq!(parse(&[]), ResponseOutcome::Timeout);
}

#[test]
fn test_parse_single_byte_is_truncated() {
    assert_eq!(parse(&[0xaa]), ResponseOutcome::Malformed(FrameFault::Truncated));
}

#[test]
fn test_parse_wrong_preamble() {
    assert_eq!(parse(&[0x55, 0x01]), ResponseOutcome::Malformed(FrameFault::BadHeader));
}

#[test]
fn test_parse_unexpected_status_byte() {
    assert_eq!(parse(&[0xaa, 0x07, 0x00]), ResponseOutcome::Malformed(FrameFault::BadHeader));
}

#[test]
fn test_parse_recovers_ack_from_console_noise() {
    let mut raw = vec![0x46u8; 120];
    raw[77] = 0xaa;
    raw[78] = 0x01;
    assert_eq!(parse(&raw), ResponseOutcome::Ack);
}

#[test]
fn test_parse_recovers_nack_from_console_noise() {
    let mut raw = vec![0x2eu8; 150];
    raw[40] = 0xaa;
    raw[41] = 0x00;
    raw[42] = 0x02;
    assert_eq!(parse(&raw), ResponseOutcome::Nack(ErrorCode::ReadOnly));
}

#[test]
fn test_parse_noise_without_frame() {
    let raw = vec![0x55u8; 150];
    assert_eq!(parse(&raw), ResponseOutcome::Malformed(FrameFault::NoSignature));
}
