//! A Modbus TCP server/client library built on [Tokio](https://docs.rs/tokio).
//!
//! The server side is organized around a [`data::DataArea`]: a thread-safe,
//! capacity-bounded store of the four Modbus register kinds that any number
//! of concurrent sessions share. Request PDUs are decoded, validated, and
//! executed against the area by a synchronous engine
//! ([`server::process`]), so all suspension happens at the socket boundary.
//!
//! # Supported function codes
//!
//! * Read Coils (`0x01`)
//! * Read Discrete Inputs (`0x02`)
//! * Read Holding Registers (`0x03`)
//! * Read Input Registers (`0x04`)
//! * Write Single Coil (`0x05`)
//! * Write Single Register (`0x06`)
//! * Write Multiple Coils (`0x0F`)
//! * Write Multiple Registers (`0x10`)
//!
//! Any other function code receives an `IllegalFunction` exception response.
//!
//! # Example server
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::str::FromStr;
//! use std::sync::Arc;
//!
//! use tokbus::data::{DataArea, ValuePattern};
//! use tokbus::server::spawn_tcp_server_task;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let area = Arc::new(DataArea::new());
//!     area.generate_coils(0, 100, ValuePattern::Zeros)?;
//!     area.generate_holding_registers(0, 100, ValuePattern::Incremental)?;
//!
//!     let _server =
//!         spawn_tcp_server_task(SocketAddr::from_str("0.0.0.0:502")?, area).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example client
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::str::FromStr;
//!
//! use tokbus::client::Client;
//! use tokbus::types::{AddressRange, UnitId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = SocketAddr::from_str("127.0.0.1:502")?;
//!     let mut client = Client::connect(addr, UnitId::new(0x01)).await?;
//!
//!     for coil in client.read_coils(AddressRange::try_from(0, 5)?).await? {
//!         println!("index: {} value: {}", coil.index, coil.value);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(
    non_camel_case_types,
    non_snake_case,
    non_upper_case_globals,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces
)]

/// Connect-and-request TCP client
pub mod client;
/// Protocol limits, per-kind capacities, and wire-level sizes
pub mod constants;
/// The register store that sessions serve
pub mod data;
/// Error taxonomy for framing, parsing, and storage
pub mod error;
/// Exception codes carried in exception responses
pub mod exception;
/// TCP server and the request engine behind it
pub mod server;
/// Request/response vocabulary: ranges, indexed values, identifiers
pub mod types;

// framing and function-code plumbing shared by both endpoints
mod common;

pub use common::bits::num_bytes_for_bits;
pub use common::frame::MbapHeader;
