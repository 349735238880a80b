use thiserror::Error;

use super::{crc, FrameConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Payload length outside `[1, max_data_len]`
    #[error("payload length {len} outside 1..={max} bytes")]
    InvalidLength { len: usize, max: u8 },
}

/// Encodes `command` into a wire frame.
///
/// The CRC covers the length byte and the payload, not the framing bytes,
/// and is appended low byte first.
pub fn build_frame(config: &FrameConfig, command: &str) -> Result<Vec<u8>, FrameError> {
    let data = command.as_bytes();
    let len = data.len();
    if len == 0 || len > config.max_data_len as usize {
        return Err(FrameError::InvalidLength {
            len,
            max: config.max_data_len,
        });
    }

    let mut covered = Vec::with_capacity(len + 1);
    covered.push(len as u8);
    covered.extend_from_slice(data);
    let crc = crc::checksum(&covered);

    let mut frame = Vec::with_capacity(len + 5);
    frame.push(config.stx);
    frame.push(len as u8);
    frame.extend_from_slice(data);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
    frame.push(config.etx);
    Ok(frame)
}
