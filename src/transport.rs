//! The serial link underneath the protocol client.
//!
//! [`Transport`] is the narrow contract the exchange logic needs: write a
//! frame, poll how much input is pending, read a bounded amount, throw
//! pending input away. [`SerialTransport`] implements it over a real port;
//! tests swap in a scripted mock.

use async_trait::async_trait;
use log::debug;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

#[async_trait]
pub trait Transport: Send {
    /// Write a whole frame and flush it out to the wire.
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// How many received bytes are waiting to be read.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `count` bytes, returning early with whatever arrived
    /// once the read timeout expires.
    async fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>>;

    /// Drop any received bytes that have not been read yet.
    fn discard_input(&mut self) -> io::Result<()>;
}

/// [`Transport`] over a serial port.
pub struct SerialTransport {
    port: SerialStream,
    read_timeout: Duration,
}

fn to_io_error(err: tokio_serial::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl SerialTransport {
    /// Open the port at `path` with the given baud rate. `read_timeout`
    /// bounds every read and write; the device normally answers well
    /// within a second.
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> io::Result<Self> {
        let mut port = tokio_serial::new(path, baud)
            .timeout(read_timeout)
            .open_native_async()
            .map_err(to_io_error)?;

        #[cfg(unix)]
        port.set_exclusive(false).map_err(to_io_error)?;

        debug!("opened {path} at {baud} baud");

        Ok(Self { port, read_timeout })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        debug!("TX: {}", hex::encode(frame));
        timeout(self.read_timeout, async {
            self.port.write_all(frame).await?;
            self.port.flush().await
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "serial write timed out"))?
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let count = self.port.bytes_to_read().map_err(to_io_error)?;
        Ok(count as usize)
    }

    async fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        let mut filled = 0;
        while filled < count {
            match timeout(self.read_timeout, self.port.read(&mut buffer[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => return Err(e),
                // Like a blocking port read, a timeout hands back whatever
                // arrived in time.
                Err(_) => break,
            }
        }
        buffer.truncate(filled);
        debug!("RX: {}", hex::encode(&buffer));
        Ok(buffer)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(to_io_error)
    }
}
