use anyhow::Context;
use battereg::{RegisterClient, ResponseOutcome, SerialTransport, Transport};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Read and write BMS registers over a serial link")]
struct Args {
    /// Serial port the BMS is attached to (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long)]
    port: String,

    /// Baud rate of the serial link
    #[arg(short, long, default_value_t = 115200)]
    baud: u32,

    /// Serial read timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read one register and print its value
    Read {
        /// Register address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_u16)]
        address: u16,
    },
    /// Write one register, then read it back to verify
    Write {
        /// Register address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_u16)]
        address: u16,
        /// Value to store, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_u16)]
        value: u16,
    },
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse()
            .map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let transport = SerialTransport::open(&args.port, args.baud, Duration::from_millis(args.timeout_ms))
        .with_context(|| format!("failed to open {}", args.port))?;
    let mut client = RegisterClient::new(transport);

    // The controller spills boot logs onto the same UART; get rid of them
    // before talking to it.
    client.drain_boot_noise().await?;

    match args.command {
        Some(Command::Read { address }) => {
            let outcome = client.read_register(address).await?;
            report_read(address, &outcome);
            exit_status(&outcome)
        }
        Some(Command::Write { address, value }) => {
            let outcome = client.write_register(address, value).await?;
            report_write(address, value, &outcome);
            if outcome == ResponseOutcome::Ack {
                let verify = client.read_register(address).await?;
                report_read(address, &verify);
            }
            exit_status(&outcome)
        }
        None => shell(&mut client).await,
    }
}

const HELP: &str = "\
commands:
  r <addr>          read a register
  w <addr> <val>    write a register, then read it back
  q                 quit
addresses and values are decimal or 0x-prefixed hex
some registers worth trying:
  0x012C  fully charged voltage (mV)
  0x0157  current measurement offset
  0x0064  cell 1 voltage (mV)";

/// Prompt loop for poking registers by hand.
async fn shell<T: Transport>(client: &mut RegisterClient<T>) -> anyhow::Result<()> {
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["q"] | ["quit"] => return Ok(()),
            ["r", addr] => match parse_u16(addr) {
                Ok(address) => {
                    let outcome = client.read_register(address).await?;
                    report_read(address, &outcome);
                }
                Err(e) => println!("bad address: {e}"),
            },
            ["w", addr, val] => match (parse_u16(addr), parse_u16(val)) {
                (Ok(address), Ok(value)) => {
                    let outcome = client.write_register(address, value).await?;
                    report_write(address, value, &outcome);
                    if outcome == ResponseOutcome::Ack {
                        let verify = client.read_register(address).await?;
                        report_read(address, &verify);
                    }
                }
                (Err(e), _) | (_, Err(e)) => println!("bad number: {e}"),
            },
            _ => println!("{HELP}"),
        }
    }
}

fn report_read(address: u16, outcome: &ResponseOutcome) {
    match outcome {
        ResponseOutcome::Value(value) => println!("0x{address:04X} = {value} (0x{value:04X})"),
        ResponseOutcome::Ack => println!("0x{address:04X}: unexpected write acknowledgement"),
        ResponseOutcome::Nack(code) => println!("0x{address:04X}: refused: {code}"),
        ResponseOutcome::Malformed(fault) => println!("0x{address:04X}: bad reply: {fault}"),
        ResponseOutcome::Timeout => println!("0x{address:04X}: no reply"),
    }
}

fn report_write(address: u16, value: u16, outcome: &ResponseOutcome) {
    match outcome {
        ResponseOutcome::Ack => println!("0x{address:04X} <- {value} (0x{value:04X}): accepted"),
        ResponseOutcome::Value(v) => println!("0x{address:04X}: unexpected value reply ({v})"),
        ResponseOutcome::Nack(code) => println!("0x{address:04X}: refused: {code}"),
        ResponseOutcome::Malformed(fault) => println!("0x{address:04X}: bad reply: {fault}"),
        ResponseOutcome::Timeout => println!("0x{address:04X}: no reply"),
    }
}

fn exit_status(outcome: &ResponseOutcome) -> anyhow::Result<()> {
    match outcome {
        ResponseOutcome::Value(_) | ResponseOutcome::Ack => Ok(()),
        ResponseOutcome::Nack(code) => Err(anyhow::anyhow!("device refused the request: {code}")),
        ResponseOutcome::Malformed(fault) => Err(anyhow::anyhow!("bad reply: {fault}")),
        ResponseOutcome::Timeout => Err(anyhow::anyhow!("no reply from the device")),
    }
}
