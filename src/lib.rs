//! Client for the TCP control protocol of GX-format 3D printers, and the GX
//! container codec the printers spool.

pub mod config;
pub mod connection;
pub mod container;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod utils;

pub use connection::{ConnectOptions, ConnectionState, ProtocolConnection};
pub use container::{GxFile, GxHeader};
pub use error::{ConnectionError, Error, FormatError, Result};
pub use printer::PrintReceipt;
pub use protocol::{ChunkFrame, Command, Payload};
pub use session::Reply;
pub use telemetry::{PrinterStatus, Progress, Value};
