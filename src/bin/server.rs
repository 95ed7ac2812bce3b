//! Demo Modbus TCP server backed by a generated data area

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;

use tokbus::data::{DataArea, RegisterKind, ValuePattern};
use tokbus::server::spawn_tcp_server_task;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(long, default_value = "0.0.0.0")]
    address: IpAddr,

    /// TCP port to listen on
    #[clap(long, default_value_t = tokbus::constants::DEFAULT_PORT)]
    port: u16,

    /// How many registers of each kind to generate
    #[clap(long, default_value_t = 100)]
    count: u16,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    let area = Arc::new(DataArea::new());
    area.generate_coils(0, args.count, ValuePattern::Random)?;
    area.generate_discrete_inputs(0, args.count, ValuePattern::Ones)?;
    area.generate_holding_registers(0, args.count, ValuePattern::Incremental)?;
    area.generate_input_registers(0, args.count, ValuePattern::Random)?;

    let last = args.count.saturating_sub(1);
    for kind in [
        RegisterKind::Coil,
        RegisterKind::DiscreteInput,
        RegisterKind::HoldingRegister,
        RegisterKind::InputRegister,
    ] {
        tracing::info!(
            "populated {} through {}",
            kind.legacy_address(0),
            kind.legacy_address(last)
        );
    }

    let addr = SocketAddr::new(args.address, args.port);
    let _server = spawn_tcp_server_task(addr, area).await?;
    tracing::info!("listening on {}", addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
