//! Read and write individual registers on certain models of LiFePO4 Battery
//! Management Systems over a serial link.
//!
//! Tested with a Tiny BMS style controller whose firmware shares one UART
//! between a debug console and a small binary request-response protocol:
//! every frame starts with `0xAA`, carries a command byte and a little
//! endian payload, and ends with a MODBUS CRC. The parser tolerates console
//! text spilling into a reply and resynchronizes on the frame signature.
//!
//! Reads return the 16-bit register value; writes are acknowledged or
//! refused with a device error code. Both come back as a
//! [`ResponseOutcome`] rather than an error, so callers can react to a
//! NACK or a timeout without unwinding.
//!
//! # Example
//!
//! ```no_run
//! # use std::time::Duration;
//! # use battereg::{RegisterClient, SerialTransport};
//! #
//! # #[tokio::main]
//! # pub async fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 115200, Duration::from_secs(1))?;
//!     let mut client = RegisterClient::new(transport);
//!     client.drain_boot_noise().await?;
//!     let outcome = client.read_register(0x012C).await?;
//!     println!("{outcome:?}");
//! #     Ok(())
//! # }
//! ```

pub mod message;
mod register_client;
pub mod transport;

#[cfg(test)]
mod mock_serial;

pub use message::{ErrorCode, FrameFault, ResponseOutcome};
pub use register_client::{ExchangeConfig, RegisterClient};
pub use transport::{SerialTransport, Transport};
