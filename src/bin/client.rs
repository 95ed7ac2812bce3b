//! Command-line Modbus TCP client

use std::net::{IpAddr, SocketAddr};

use clap::{Parser, Subcommand};

use tokbus::client::Client;
use tokbus::types::{AddressRange, Indexed, UnitId};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(long, default_value = "127.0.0.1")]
    address: IpAddr,

    /// Server port
    #[clap(long, default_value_t = tokbus::constants::DEFAULT_PORT)]
    port: u16,

    /// Unit identifier to address
    #[clap(long, default_value_t = 0xFF)]
    unit: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a range of coils
    ReadCoils { start: u16, quantity: u16 },
    /// Read a range of discrete inputs
    ReadDiscreteInputs { start: u16, quantity: u16 },
    /// Read a range of holding registers
    ReadHoldingRegisters { start: u16, quantity: u16 },
    /// Read a range of input registers
    ReadInputRegisters { start: u16, quantity: u16 },
    /// Write a single coil
    WriteSingleCoil { address: u16, value: bool },
    /// Write a single holding register
    WriteSingleRegister { address: u16, value: u16 },
    /// Write multiple coils from a bit string such as 10110
    WriteMultipleCoils { start: u16, bits: String },
    /// Write multiple holding registers
    WriteMultipleRegisters { start: u16, values: Vec<u16> },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    let addr = SocketAddr::new(args.address, args.port);
    let mut client = Client::connect(addr, UnitId::new(args.unit)).await?;

    match args.command {
        Command::ReadCoils { start, quantity } => {
            print_bits(
                client
                    .read_coils(AddressRange::try_from(start, quantity)?)
                    .await?,
            );
        }
        Command::ReadDiscreteInputs { start, quantity } => {
            print_bits(
                client
                    .read_discrete_inputs(AddressRange::try_from(start, quantity)?)
                    .await?,
            );
        }
        Command::ReadHoldingRegisters { start, quantity } => {
            print_registers(
                client
                    .read_holding_registers(AddressRange::try_from(start, quantity)?)
                    .await?,
            );
        }
        Command::ReadInputRegisters { start, quantity } => {
            print_registers(
                client
                    .read_input_registers(AddressRange::try_from(start, quantity)?)
                    .await?,
            );
        }
        Command::WriteSingleCoil { address, value } => {
            let echo = client.write_single_coil(Indexed::new(address, value)).await?;
            println!("address {}: {}", echo.index, echo.value);
        }
        Command::WriteSingleRegister { address, value } => {
            let echo = client
                .write_single_register(Indexed::new(address, value))
                .await?;
            println!("address {}: {}", echo.index, echo.value);
        }
        Command::WriteMultipleCoils { start, bits } => {
            let values = parse_bit_string(&bits)?;
            let range = client.write_multiple_coils(start, &values).await?;
            println!("wrote {} coils starting at {}", range.count, range.start);
        }
        Command::WriteMultipleRegisters { start, values } => {
            let range = client.write_multiple_registers(start, &values).await?;
            println!(
                "wrote {} registers starting at {}",
                range.count, range.start
            );
        }
    }

    Ok(())
}

fn print_bits(values: Vec<Indexed<bool>>) {
    for x in values {
        println!("address {}: {}", x.index, x.value);
    }
}

fn print_registers(values: Vec<Indexed<u16>>) {
    for x in values {
        println!("address {}: {}", x.index, x.value);
    }
}

fn parse_bit_string(input: &str) -> Result<Vec<bool>, String> {
    input
        .chars()
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            _ => Err(format!("bad character in bit string: {c}")),
        })
        .collect()
}
