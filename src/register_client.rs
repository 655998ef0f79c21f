//! The register exchange: one request, one reply, over an exclusively
//! owned transport.

use crate::message::{read_message, write_message, ResponseOutcome, NOISE_THRESHOLD};
use crate::transport::Transport;
use log::warn;
use tokio::time::{sleep, Duration};

/// Timing knobs for the exchange. The defaults match the observed device
/// behavior: it answers within the settle window but shares its UART with
/// a debug console that needs draining first.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// How long to wait after sending before collecting the reply.
    pub settle: Duration,
    /// How many drain rounds to run before each exchange.
    pub flush_attempts: u32,
    /// Pause between drain rounds.
    pub flush_poll: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(200),
            flush_attempts: 5,
            flush_poll: Duration::from_millis(100),
        }
    }
}

/// A client for the register protocol over one transport handle.
///
/// The protocol has no request identifiers, so only one request can ever
/// be in flight; both exchange methods take `&mut self` for the whole
/// transaction, which rules out interleaving at compile time.
pub struct RegisterClient<T: Transport> {
    transport: T,
    config: ExchangeConfig,
}

impl<T: Transport> RegisterClient<T> {
    // The boot spill is worse than the steady-state one, so the one-off
    // drain polls longer and more often.
    const BOOT_FLUSH_ATTEMPTS: u32 = 10;
    const BOOT_FLUSH_POLL: Duration = Duration::from_millis(200);

    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ExchangeConfig::default())
    }

    pub fn with_config(transport: T, config: ExchangeConfig) -> Self {
        Self { transport, config }
    }

    /// Read one register. Protocol-level failures (NACK, bad frame, no
    /// reply) come back as data in the outcome; only transport failures
    /// are errors.
    pub async fn read_register(&mut self, address: u16) -> anyhow::Result<ResponseOutcome> {
        let frame = read_message::request(address);
        let raw = self.exchange(&frame).await?;
        Ok(read_message::parse(&raw))
    }

    /// Write one register. `Ack` means the device accepted the value;
    /// read the register back afterwards to confirm what it stored.
    pub async fn write_register(&mut self, address: u16, value: u16) -> anyhow::Result<ResponseOutcome> {
        let frame = write_message::request(address, value);
        let raw = self.exchange(&frame).await?;
        Ok(write_message::parse(&raw))
    }

    /// Drain the console spill the firmware produces right after boot.
    /// Worth calling once after opening the port; every exchange flushes
    /// again anyway, with fewer and shorter rounds.
    pub async fn drain_boot_noise(&mut self) -> anyhow::Result<()> {
        self.flush_stale_input(Self::BOOT_FLUSH_ATTEMPTS, Self::BOOT_FLUSH_POLL)
            .await
    }

    async fn exchange(&mut self, frame: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.flush_stale_input(self.config.flush_attempts, self.config.flush_poll)
            .await?;

        self.transport.write_frame(frame).await?;
        sleep(self.config.settle).await;

        self.read_available().await
    }

    /// Discard whatever is sitting in the input buffer, polling a few
    /// times because the console can keep writing while we drain.
    async fn flush_stale_input(&mut self, attempts: u32, poll: Duration) -> anyhow::Result<()> {
        for _ in 0..attempts {
            self.transport.discard_input()?;
            sleep(poll).await;

            let pending = self.transport.bytes_available()?;
            if pending == 0 {
                break;
            }
            let junk = self.transport.read_bytes(pending).await?;
            if junk.len() > NOISE_THRESHOLD {
                warn!("drained {} bytes of console spill", junk.len());
            }
        }

        // One last settle in case the console was mid-line.
        sleep(self.config.settle).await;
        let pending = self.transport.bytes_available()?;
        if pending > 0 {
            let junk = self.transport.read_bytes(pending).await?;
            warn!("late console spill, drained {} bytes", junk.len());
        }

        Ok(())
    }

    async fn read_available(&mut self) -> anyhow::Result<Vec<u8>> {
        let pending = self.transport.bytes_available()?;
        if pending == 0 {
            return Ok(Vec::new());
        }
        Ok(self.transport.read_bytes(pending).await?)
    }
}

#[cfg(test)]
use crate::message::ErrorCode;
#[cfg(test)]
use crate::mock_serial::MockSerial;

#[tokio::test]
async fn test_read_register_happy() {
    let reply = hex::decode("aa0902570164000327").unwrap();
    let mut client = RegisterClient::new(MockSerial::answering(&reply));
    let outcome = client.read_register(0x0157).await.unwrap();
    assert_eq!(outcome, ResponseOutcome::Value(100));
    assert_eq!(client.transport.writes, vec![hex::decode("aa0902570161b4").unwrap()]);
}

#[tokio::test]
async fn test_read_register_timeout() {
    let mut client = RegisterClient::new(MockSerial::silent());
    let outcome = client.read_register(0x0001).await.unwrap();
    assert_eq!(outcome, ResponseOutcome::Timeout);
}

#[tokio::test]
async fn test_write_register_ack() {
    let mut client = RegisterClient::new(MockSerial::answering(&[0xaa, 0x01]));
    let outcome = client.write_register(0x012c, 4200).await.unwrap();
    assert_eq!(outcome, ResponseOutcome::Ack);
    assert_eq!(client.transport.writes, vec![hex::decode("aa0d042c016810968b").unwrap()]);
}

#[tokio::test]
async fn test_write_register_nack() {
    let mut client = RegisterClient::new(MockSerial::answering(&[0xaa, 0x00, 0x02]));
    let outcome = client.write_register(0x0042, 1).await.unwrap();
    assert_eq!(outcome, ResponseOutcome::Nack(ErrorCode::ReadOnly));
}

#[tokio::test]
async fn test_exchange_flushes_console_spill_first() {
    let reply = hex::decode("aa0902570164000327").unwrap();
    let mock = MockSerial::answering(&reply)
        .with_noise(b"boot: bms v1.3\r\n")
        .with_noise(&[0x55; 140]);
    let mut client = RegisterClient::new(mock);
    let outcome = client.read_register(0x0157).await.unwrap();
    assert_eq!(outcome, ResponseOutcome::Value(100));
    assert!(client.transport.discards >= 2);
}

#[tokio::test]
async fn test_drain_boot_noise_clears_pending_input() {
    let mock = MockSerial::silent()
        .with_noise(&[0x55; 30])
        .with_noise(&[0x55; 30]);
    let mut client = RegisterClient::new(mock);
    client.drain_boot_noise().await.unwrap();
    assert_eq!(client.transport.bytes_available().unwrap(), 0);
}
