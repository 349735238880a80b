use super::{crc, FrameConfig};

/// Parser position within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitStx,
    ReadLen,
    ReadData,
    ReadCrcLo,
    ReadCrcHi,
    WaitEtx,
}

/// Streaming parser for incoming frames.
///
/// Fed one byte at a time; returns the payload of each frame whose length,
/// CRC and trailer all check out. Everything else is discarded and the
/// parser returns to hunting for the next STX, so corrupt input can only
/// ever cost the frame it arrived in.
///
/// An STX byte inside the data region is treated as data. There is no
/// mid-frame resync: the protocol assumes a low-noise link and lets the CRC
/// discriminate, resyncing at the next STX after a bad length, CRC or
/// trailer.
#[derive(Debug)]
pub struct FrameParser {
    config: FrameConfig,
    state: State,
    buf: Vec<u8>,
    expected_len: usize,
    received_crc: u16,
}

impl FrameParser {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            state: State::WaitStx,
            buf: Vec::with_capacity(config.max_data_len as usize),
            expected_len: 0,
            received_crc: 0,
        }
    }

    /// Consumes one byte; returns a payload when it completes a valid frame.
    pub fn process_byte(&mut self, byte: u8) -> Option<Vec<u8>> {
        match self.state {
            State::WaitStx => {
                if byte == self.config.stx {
                    self.buf.clear();
                    self.received_crc = 0;
                    self.state = State::ReadLen;
                }
                None
            }
            State::ReadLen => {
                self.expected_len = byte as usize;
                // A zero or oversized length drops the frame; this also
                // protects against a spurious STX seen in noise
                self.state = if (1..=self.config.max_data_len).contains(&byte) {
                    State::ReadData
                } else {
                    State::WaitStx
                };
                None
            }
            State::ReadData => {
                self.buf.push(byte);
                if self.buf.len() == self.expected_len {
                    self.state = State::ReadCrcLo;
                }
                None
            }
            State::ReadCrcLo => {
                self.received_crc = byte as u16;
                self.state = State::ReadCrcHi;
                None
            }
            State::ReadCrcHi => {
                self.received_crc |= (byte as u16) << 8;
                self.state = State::WaitEtx;
                None
            }
            State::WaitEtx => {
                let emitted = if byte == self.config.etx {
                    let mut covered = Vec::with_capacity(self.buf.len() + 1);
                    covered.push(self.expected_len as u8);
                    covered.extend_from_slice(&self.buf);
                    (crc::checksum(&covered) == self.received_crc).then(|| self.buf.clone())
                } else {
                    None
                };
                // Reset is unconditional: a corrupt frame never leaves the
                // parser stuck mid-frame
                self.state = State::WaitStx;
                emitted
            }
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buf.len()
    }
}
