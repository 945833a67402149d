pub mod binary;
pub mod envelope;
pub mod meta;
pub mod rrdb;

mod base;
pub use base::{ErrCode, Gpid, RpcAddress, Status};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame is truncated")]
    Truncated,
    #[error("unknown wire type {0}")]
    BadType(u8),
    #[error("malformed message header")]
    BadHeader,
    #[error("negative length field")]
    BadLength,
    #[error("frame of {0} bytes exceeds the frame limit")]
    TooLarge(usize),
    #[error("string field is not valid utf-8")]
    BadUtf8,
}
