//! The read-register transaction: command `0x09`, reply carrying the
//! 16-bit register value.

use super::{crc16, recover_frame, ErrorCode, FrameFault, ResponseOutcome, NOISE_THRESHOLD, PREAMBLE};

/// Command byte of a register read.
pub (crate) const COMMAND: u8 = 0x09;
/// Payload length byte of a read request: two address bytes.
const REQUEST_PAYLOAD_LEN: u8 = 0x02;
/// A well formed read reply is exactly this long, and this is also the
/// window sliced out of a noisy buffer during frame recovery.
pub (crate) const RESPONSE_LEN: usize = 9;

/// Build the request frame for reading one register.
///
/// Start Byte | End Byte | Meaning
/// 0          | 0        | Preamble 0xAA
/// 1          | 1        | Command 0x09
/// 2          | 2        | Payload length 0x02
/// 3          | 4        | Register address, LSB first
/// 5          | 6        | MODBUS CRC over bytes 0-4, LSB first
pub fn request(address: u16) -> [u8; 7] {
    let [addr_lsb, addr_msb] = address.to_le_bytes();
    let mut frame = [PREAMBLE, COMMAND, REQUEST_PAYLOAD_LEN, addr_lsb, addr_msb, 0, 0];
    let crc = crc16(&frame[..5]).to_le_bytes();
    frame[5] = crc[0];
    frame[6] = crc[1];
    frame
}

/// Decode the reply to a read request.
///
/// A good reply is 9 bytes:
///
/// Start Byte | End Byte | Meaning
/// 0          | 1        | Echoed preamble and command [0xAA, 0x09]
/// 2          | 4        | Payload length and echoed address
/// 5          | 6        | The register value, LSB first
/// 7          | 8        | MODBUS CRC over bytes 0-6
///
/// An empty buffer reports [`ResponseOutcome::Timeout`]. A buffer longer
/// than [`NOISE_THRESHOLD`] is assumed to carry console text around the
/// frame and is scanned for the `[0xAA, 0x09]` signature first. A reply
/// starting `[0xAA, 0x00]` is the device refusing the read, with the error
/// code in the next byte.
pub fn parse(raw: &[u8]) -> ResponseOutcome {
    if raw.is_empty() {
        return ResponseOutcome::Timeout;
    }

    let buffer = if raw.len() > NOISE_THRESHOLD {
        match recover_frame(raw, RESPONSE_LEN, |b| b == COMMAND) {
            Some(frame) => frame,
            None => return ResponseOutcome::Malformed(FrameFault::NoSignature),
        }
    } else {
        raw
    };

    if buffer.len() >= RESPONSE_LEN && buffer[0] == PREAMBLE && buffer[1] == COMMAND {
        let end = buffer.len();
        // The trailer is read back MSB first although it is written LSB
        // first. Kept as is for compatibility with deployed firmware.
        let received = (u16::from(buffer[end - 1]) << 8) | u16::from(buffer[end - 2]);
        let computed = crc16(&buffer[..end - 2]);
        if received != computed {
            return ResponseOutcome::Malformed(FrameFault::CrcMismatch);
        }
        let value = (u16::from(buffer[6]) << 8) | u16::from(buffer[5]);
        return ResponseOutcome::Value(value);
    }

    if buffer.len() >= 2 && buffer[0] == PREAMBLE && buffer[1] == 0x00 {
        let code = buffer
            .get(2)
            .copied()
            .map(ErrorCode::from_byte)
            .unwrap_or(ErrorCode::Unknown);
        return ResponseOutcome::Nack(code);
    }

    if buffer.len() >= 2 && buffer[0] == PREAMBLE && buffer[1] == COMMAND {
        return ResponseOutcome::Malformed(FrameFault::Truncated);
    }

    ResponseOutcome::Malformed(FrameFault::BadHeader)
}

#[test]
fn test_request_known_frame() {
    let frame = request(0x0157);
    assert_eq!(frame.to_vec(), hex::decode("aa0902570161b4").unwrap());
}

#[test]
fn test_request_crc_covers_header_and_address() {
    for address in [0x0000u16, 0x0001, 0x0064, 0x012c, 0x0157, 0x8000, 0xffff] {
        let frame = request(address);
        assert_eq!(frame.len(), 7);
        assert_eq!(frame[0], 0xaa);
        assert_eq!(frame[1], 0x09);
        assert_eq!(frame[2], 0x02);
        assert_eq!(u16::from_le_bytes([frame[3], frame[4]]), address);
        assert_eq!(frame[5..], crc16(&frame[..5]).to_le_bytes());
    }
}

#[test]
fn test_parse_value_reply() {
    let raw = hex::decode("aa0902570164000327").unwrap();
    assert_eq!(parse(&raw), ResponseOutcome::Value(100));
}

#[test]
fn test_parse_value_reply_high_bit() {
    // 0x8068 = 32872, exercises the MSB path of the value field
    let raw = hex::decode("aa09022c0168801f63").unwrap();
    assert_eq!(parse(&raw), ResponseOutcome::Value(0x8068));
}

#[test]
fn test_parse_empty_is_timeout() {
    assert_eq!(parse(&[]), ResponseOutcome::Timeout);
}

#[test]
fn test_parse_bad_crc() {
    let raw = hex::decode("aa0902570164000328").unwrap();
    assert_eq!(parse(&raw), ResponseOutcome::Malformed(FrameFault::CrcMismatch));
}

#[test]
fn test_parse_any_single_byte_corruption_is_malformed() {
    let good = hex::decode("aa0902570164000327").unwrap();
    for i in 0..good.len() {
        let mut bad = good.clone();
        bad[i] ^= 0xff;
        assert!(
            matches!(parse(&bad), ResponseOutcome::Malformed(_)),
            "corrupted byte {i} still parsed"
        );
    }
}

#[test]
fn test_parse_nack_codes() {
    assert_eq!(parse(&[0xaa, 0x00, 0x01]), ResponseOutcome::Nack(ErrorCode::InvalidAddress));
    assert_eq!(parse(&[0xaa, 0x00, 0x04]), ResponseOutcome::Nack(ErrorCode::CrcError));
    assert_eq!(parse(&[0xaa, 0x00, 0x99]), ResponseOutcome::Nack(ErrorCode::Unknown));
    assert_eq!(parse(&[0xaa, 0x00]), ResponseOutcome::Nack(ErrorCode::Unknown));
}

#[test]
fn test_parse_truncated_reply() {
    let raw = hex::decode("aa090257").unwrap();
    assert_eq!(parse(&raw), ResponseOutcome::Malformed(FrameFault::Truncated));
}

#[test]
fn test_parse_wrong_header() {
    let raw = hex::decode("550902570164000327").unwrap();
    assert_eq!(parse(&raw), ResponseOutcome::Malformed(FrameFault::BadHeader));
}

#[test]
fn test_parse_recovers_frame_from_console_noise() {
    let frame = hex::decode("aa0902570164000327").unwrap();
    let mut raw = vec![0x20u8; 150];
    raw[40..49].copy_from_slice(&frame);
    assert_eq!(parse(&raw), ResponseOutcome::Value(100));
}

#[test]
fn test_parse_noise_without_frame() {
    let raw = vec![0x55u8; 150];
    assert_eq!(parse(&raw), ResponseOutcome::Malformed(FrameFault::NoSignature));
}

#[test]
fn test_parse_frame_cut_off_at_buffer_end() {
    let mut raw = vec![0x20u8; 150];
    raw[146] = 0xaa;
    raw[147] = 0x09;
    assert_eq!(parse(&raw), ResponseOutcome::Malformed(FrameFault::Truncated));
}
