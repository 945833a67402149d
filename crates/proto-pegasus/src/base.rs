use std::fmt;
use std::net::Ipv4Addr;

/// Server-level error codes carried in the reply envelope, ahead of any
/// result structure. These describe the fate of the RPC itself, not of the
/// record it addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrCode {
    Ok = 0,
    Unknown = 1,
    Timeout = 2,
    Busy = 3,
    InvalidState = 4,
    ObjectNotFound = 5,
    InvalidParameters = 6,
    ParentPartitionMisused = 7,
    ForwardToOthers = 8,
    AppNotExist = 9,
    SessionReset = 10,
}

impl ErrCode {
    pub fn from_i32(v: i32) -> ErrCode {
        match v {
            0 => ErrCode::Ok,
            2 => ErrCode::Timeout,
            3 => ErrCode::Busy,
            4 => ErrCode::InvalidState,
            5 => ErrCode::ObjectNotFound,
            6 => ErrCode::InvalidParameters,
            7 => ErrCode::ParentPartitionMisused,
            8 => ErrCode::ForwardToOthers,
            9 => ErrCode::AppNotExist,
            10 => ErrCode::SessionReset,
            _ => ErrCode::Unknown,
        }
    }

    /// Codes that mean the caller addressed a replica which is not (or is
    /// no longer) the primary for the partition. The partition table must
    /// be refreshed before retrying.
    pub fn is_routing_stale(self) -> bool {
        matches!(
            self,
            ErrCode::InvalidState
                | ErrCode::ObjectNotFound
                | ErrCode::ParentPartitionMisused
                | ErrCode::ForwardToOthers
        )
    }

    /// Codes worth retrying against the same replica after a backoff.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrCode::Timeout | ErrCode::Busy)
    }

    pub fn as_str_name(&self) -> &'static str {
        match self {
            ErrCode::Ok => "ERR_OK",
            ErrCode::Unknown => "ERR_UNKNOWN",
            ErrCode::Timeout => "ERR_TIMEOUT",
            ErrCode::Busy => "ERR_BUSY",
            ErrCode::InvalidState => "ERR_INVALID_STATE",
            ErrCode::ObjectNotFound => "ERR_OBJECT_NOT_FOUND",
            ErrCode::InvalidParameters => "ERR_INVALID_PARAMETERS",
            ErrCode::ParentPartitionMisused => "ERR_PARENT_PARTITION_MISUSED",
            ErrCode::ForwardToOthers => "ERR_FORWARD_TO_OTHERS",
            ErrCode::AppNotExist => "ERR_APP_NOT_EXIST",
            ErrCode::SessionReset => "ERR_SESSION_RESET",
        }
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

/// Application status codes carried inside result structures. `Ok` and
/// `NotFound` are ordinary outcomes for reads; everything else is a
/// storage-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Corruption,
    NotSupported,
    InvalidArgument,
    IoError,
    Other(i32),
}

impl Status {
    pub fn from_i32(v: i32) -> Status {
        match v {
            0 => Status::Ok,
            1 => Status::NotFound,
            2 => Status::Corruption,
            3 => Status::NotSupported,
            4 => Status::InvalidArgument,
            5 => Status::IoError,
            other => Status::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::NotFound => 1,
            Status::Corruption => 2,
            Status::NotSupported => 3,
            Status::InvalidArgument => 4,
            Status::IoError => 5,
            Status::Other(v) => v,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("ok"),
            Status::NotFound => f.write_str("not found"),
            Status::Corruption => f.write_str("corruption"),
            Status::NotSupported => f.write_str("not supported"),
            Status::InvalidArgument => f.write_str("invalid argument"),
            Status::IoError => f.write_str("i/o error"),
            Status::Other(v) => write!(f, "status {v}"),
        }
    }
}

/// Global partition id: a table and a partition index within it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gpid {
    pub app_id: i32,
    pub partition_index: i32,
}

impl fmt::Display for Gpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_id, self.partition_index)
    }
}

/// A replica endpoint packed into a u64 on the wire:
/// `ip << 32 | port << 16 | 1` for IPv4/TCP, zero when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RpcAddress(u64);

impl RpcAddress {
    pub const INVALID: RpcAddress = RpcAddress(0);

    pub fn new(ip: Ipv4Addr, port: u16) -> RpcAddress {
        RpcAddress((u32::from(ip) as u64) << 32 | (port as u64) << 16 | 1)
    }

    pub fn from_u64(raw: u64) -> RpcAddress {
        RpcAddress(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_invalid(self) -> bool {
        self.0 == 0
    }

    pub fn ip(self) -> Ipv4Addr {
        Ipv4Addr::from((self.0 >> 32) as u32)
    }

    pub fn port(self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl fmt::Display for RpcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port())
    }
}
