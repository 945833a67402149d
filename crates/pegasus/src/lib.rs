pub mod codec;
pub mod config;
pub mod scan;

mod batch;
mod client;
mod executor;
mod meta;
mod pool;
mod session;
mod sync;
mod table;

pub use client::{Client, MultiKey, MultiSetItem, SetItem};
pub use config::ClientOptions;
pub use scan::{Row, ScanOptions, Scanner};
pub use sync::SyncClient;
pub use table::TableHandle;

pub use proto_pegasus::{ErrCode, Status, WireError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation deadline exceeded")]
    Timeout,
    #[error("connection to {addr} failed")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server replied {}", .0.as_str_name())]
    Server(ErrCode),
    #[error("storage error: {0}")]
    Application(Status),
    #[error("client is closed")]
    Closed,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("failed to start client runtime")]
    Runtime(#[source] std::io::Error),
    #[error("{0}")]
    Protocol(&'static str),
}

impl Error {
    /// True for outcomes worth retrying against a fresh connection.
    pub(crate) fn is_transport(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
}
