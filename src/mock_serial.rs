//! A scripted stand-in for the serial port, so exchange tests can run
//! without hardware.
//!
//! The mock plays the device side of one exchange: optional buffers of
//! console spill turn up in the input one per poll, then once a frame has
//! been written the canned reply becomes readable.

use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;

pub struct MockSerial {
    /// Console spill buffers, surfacing in the input one per poll until
    /// the queue runs dry.
    noise: VecDeque<Vec<u8>>,
    /// What the device answers once a frame has arrived.
    reply: Vec<u8>,
    reply_ready: bool,
    /// Every frame the client wrote, in order.
    pub writes: Vec<Vec<u8>>,
    /// How many times the input buffer was discarded.
    pub discards: usize,
}

impl MockSerial {
    /// A device that answers every request with `reply`.
    pub fn answering(reply: &[u8]) -> Self {
        Self {
            noise: VecDeque::new(),
            reply: reply.to_vec(),
            reply_ready: false,
            writes: Vec::new(),
            discards: 0,
        }
    }

    /// A device that never answers.
    pub fn silent() -> Self {
        Self::answering(&[])
    }

    /// Queue a buffer of console spill ahead of the reply.
    pub fn with_noise(mut self, junk: &[u8]) -> Self {
        self.noise.push_back(junk.to_vec());
        self
    }

    fn take(&mut self, count: usize) -> Vec<u8> {
        if let Some(front) = self.noise.front_mut() {
            let n = count.min(front.len());
            let out: Vec<u8> = front.drain(..n).collect();
            if front.is_empty() {
                self.noise.pop_front();
            }
            return out;
        }
        if self.reply_ready {
            let n = count.min(self.reply.len());
            return self.reply.drain(..n).collect();
        }
        Vec::new()
    }
}

#[async_trait]
impl Transport for MockSerial {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writes.push(frame.to_vec());
        self.reply_ready = true;
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        if let Some(front) = self.noise.front() {
            return Ok(front.len());
        }
        if self.reply_ready {
            return Ok(self.reply.len());
        }
        Ok(0)
    }

    async fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        Ok(self.take(count))
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.discards += 1;
        self.noise.pop_front();
        Ok(())
    }
}
