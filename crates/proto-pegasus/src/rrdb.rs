//! Argument and result structures of the storage protocol.
//!
//! Single-key operations address a record by its full composite key; the
//! multi-key operations address one hash key and enumerate sort keys. Every
//! result structure leads with an application status code and echoes the
//! partition that served it.

use crate::binary::{self, Message, TType};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};

pub const METHOD_GET: &str = "get";
pub const METHOD_PUT: &str = "put";
pub const METHOD_REMOVE: &str = "remove";
pub const METHOD_EXIST: &str = "exist";
pub const METHOD_TTL: &str = "ttl";
pub const METHOD_SORTKEY_COUNT: &str = "sortkey_count";
pub const METHOD_MULTI_GET: &str = "multi_get";
pub const METHOD_MULTI_PUT: &str = "multi_put";
pub const METHOD_MULTI_REMOVE: &str = "multi_remove";
pub const METHOD_GET_SCANNER: &str = "get_scanner";
pub const METHOD_SCAN: &str = "scan";
pub const METHOD_SCAN_CANCEL: &str = "scan_cancel";

/// Context id in a scan reply meaning the partition has no more data.
pub const SCAN_CONTEXT_COMPLETE: i64 = -1;

/// Argument of `get`, `remove`, `exist` and `ttl`: one encoded composite key.
#[derive(Debug, Clone, Default)]
pub struct KeyRequest {
    pub key: Bytes,
}

impl Message for KeyRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.key);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.key = binary::read_bytes(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Argument of `sortkey_count`: one hash key.
#[derive(Debug, Clone, Default)]
pub struct CountRequest {
    pub hash_key: Bytes,
}

impl Message for CountRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.hash_key);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.hash_key = binary::read_bytes(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Argument of `put`: key, value, and a relative expiry in seconds
/// (zero keeps the record forever).
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub key: Bytes,
    pub value: Bytes,
    pub expire_ts_seconds: i32,
}

impl Message for UpdateRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.key);
        binary::write_field(b, TType::Binary, 2);
        binary::write_bytes(b, &self.value);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.expire_ts_seconds);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.key = binary::read_bytes(b)?,
                (2, TType::Binary) => m.value = binary::read_bytes(b)?,
                (3, TType::I32) => m.expire_ts_seconds = binary::read_i32(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of the write operations (`put`, `remove`, `multi_put`,
/// `multi_remove` echoes its own count variant).
#[derive(Debug, Clone, Default)]
pub struct UpdateResponse {
    pub error: i32,
    pub app_id: i32,
    pub partition_index: i32,
    pub decree: i64,
    pub server: String,
}

impl Message for UpdateResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        binary::write_field(b, TType::I32, 2);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::I64, 4);
        b.put_i64(self.decree);
        binary::write_field(b, TType::Binary, 5);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::I32) => m.app_id = binary::read_i32(b)?,
                (3, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (4, TType::I64) => m.decree = binary::read_i64(b)?,
                (5, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `get`.
#[derive(Debug, Clone, Default)]
pub struct ReadResponse {
    pub error: i32,
    pub value: Bytes,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for ReadResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        binary::write_field(b, TType::Binary, 2);
        binary::write_bytes(b, &self.value);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 5);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::Binary) => m.value = binary::read_bytes(b)?,
                (3, TType::I32) => m.app_id = binary::read_i32(b)?,
                (4, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (5, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `exist`: the status alone answers the question.
#[derive(Debug, Clone, Default)]
pub struct ErrorResponse {
    pub error: i32,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for ErrorResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        binary::write_field(b, TType::I32, 2);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 4);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::I32) => m.app_id = binary::read_i32(b)?,
                (3, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (4, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `ttl`. A negative `ttl_seconds` means the record never expires.
#[derive(Debug, Clone, Default)]
pub struct TtlResponse {
    pub error: i32,
    pub ttl_seconds: i32,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for TtlResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        binary::write_field(b, TType::I32, 2);
        b.put_i32(self.ttl_seconds);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 5);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::I32) => m.ttl_seconds = binary::read_i32(b)?,
                (3, TType::I32) => m.app_id = binary::read_i32(b)?,
                (4, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (5, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `sortkey_count`.
#[derive(Debug, Clone, Default)]
pub struct CountResponse {
    pub error: i32,
    pub count: i64,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for CountResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        binary::write_field(b, TType::I64, 2);
        b.put_i64(self.count);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 5);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::I64) => m.count = binary::read_i64(b)?,
                (3, TType::I32) => m.app_id = binary::read_i32(b)?,
                (4, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (5, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl Message for KeyValue {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.key);
        binary::write_field(b, TType::Binary, 2);
        binary::write_bytes(b, &self.value);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.key = binary::read_bytes(b)?,
                (2, TType::Binary) => m.value = binary::read_bytes(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

fn write_kv_list(b: &mut BytesMut, id: i16, kvs: &[KeyValue]) {
    binary::write_field(b, TType::List, id);
    binary::write_list_header(b, TType::Struct, kvs.len());
    for kv in kvs {
        kv.write(b);
    }
}

fn read_kv_list(b: &mut Bytes) -> Result<Vec<KeyValue>, WireError> {
    let (elem, n) = binary::read_list_header(b)?;
    if elem != TType::Struct {
        return Err(WireError::BadType(elem as u8));
    }
    let mut kvs = Vec::with_capacity(n.min(1024));
    for _ in 0..n {
        kvs.push(KeyValue::read(b)?);
    }
    Ok(kvs)
}

fn write_bytes_list(b: &mut BytesMut, id: i16, items: &[Bytes]) {
    binary::write_field(b, TType::List, id);
    binary::write_list_header(b, TType::Binary, items.len());
    for item in items {
        binary::write_bytes(b, item);
    }
}

fn read_bytes_list(b: &mut Bytes) -> Result<Vec<Bytes>, WireError> {
    let (elem, n) = binary::read_list_header(b)?;
    if elem != TType::Binary {
        return Err(WireError::BadType(elem as u8));
    }
    let mut items = Vec::with_capacity(n.min(1024));
    for _ in 0..n {
        items.push(binary::read_bytes(b)?);
    }
    Ok(items)
}

/// Argument of `multi_get`. An empty `sort_keys` list asks for every sort
/// key under the hash key; `max_kv_count`/`max_kv_size` of zero are
/// unlimited. `no_value` projects sort keys only.
#[derive(Debug, Clone, Default)]
pub struct MultiGetRequest {
    pub hash_key: Bytes,
    pub sort_keys: Vec<Bytes>,
    pub max_kv_count: i32,
    pub max_kv_size: i32,
    pub no_value: bool,
}

impl Message for MultiGetRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.hash_key);
        write_bytes_list(b, 2, &self.sort_keys);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.max_kv_count);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.max_kv_size);
        binary::write_field(b, TType::Bool, 5);
        binary::write_bool(b, self.no_value);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.hash_key = binary::read_bytes(b)?,
                (2, TType::List) => m.sort_keys = read_bytes_list(b)?,
                (3, TType::I32) => m.max_kv_count = binary::read_i32(b)?,
                (4, TType::I32) => m.max_kv_size = binary::read_i32(b)?,
                (5, TType::Bool) => m.no_value = binary::read_bool(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `multi_get`; `kvs` maps sort key to value.
#[derive(Debug, Clone, Default)]
pub struct MultiGetResponse {
    pub error: i32,
    pub kvs: Vec<KeyValue>,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for MultiGetResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        write_kv_list(b, 2, &self.kvs);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 5);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::List) => m.kvs = read_kv_list(b)?,
                (3, TType::I32) => m.app_id = binary::read_i32(b)?,
                (4, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (5, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Argument of `multi_put`: all records share the hash key and expiry.
#[derive(Debug, Clone, Default)]
pub struct MultiPutRequest {
    pub hash_key: Bytes,
    pub kvs: Vec<KeyValue>,
    pub expire_ts_seconds: i32,
}

impl Message for MultiPutRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.hash_key);
        write_kv_list(b, 2, &self.kvs);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.expire_ts_seconds);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.hash_key = binary::read_bytes(b)?,
                (2, TType::List) => m.kvs = read_kv_list(b)?,
                (3, TType::I32) => m.expire_ts_seconds = binary::read_i32(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Argument of `multi_remove`. `max_count` of zero removes every listed
/// sort key.
#[derive(Debug, Clone, Default)]
pub struct MultiRemoveRequest {
    pub hash_key: Bytes,
    pub sort_keys: Vec<Bytes>,
    pub max_count: i64,
}

impl Message for MultiRemoveRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.hash_key);
        write_bytes_list(b, 2, &self.sort_keys);
        binary::write_field(b, TType::I64, 3);
        b.put_i64(self.max_count);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.hash_key = binary::read_bytes(b)?,
                (2, TType::List) => m.sort_keys = read_bytes_list(b)?,
                (3, TType::I64) => m.max_count = binary::read_i64(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `multi_remove`: how many records were deleted.
#[derive(Debug, Clone, Default)]
pub struct MultiRemoveResponse {
    pub error: i32,
    pub count: i64,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for MultiRemoveResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        binary::write_field(b, TType::I64, 2);
        b.put_i64(self.count);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 5);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::I64) => m.count = binary::read_i64(b)?,
                (3, TType::I32) => m.app_id = binary::read_i32(b)?,
                (4, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (5, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Argument of `get_scanner`: opens a range scan on one partition.
/// `stop_key` empty means scan to the end of the partition.
/// `min_timestamp_ms` of zero disables the value timestamp filter.
#[derive(Debug, Clone, Default)]
pub struct GetScannerRequest {
    pub start_key: Bytes,
    pub stop_key: Bytes,
    pub start_inclusive: bool,
    pub stop_inclusive: bool,
    pub batch_size: i32,
    pub no_value: bool,
    pub min_timestamp_ms: i64,
}

impl Message for GetScannerRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_bytes(b, &self.start_key);
        binary::write_field(b, TType::Binary, 2);
        binary::write_bytes(b, &self.stop_key);
        binary::write_field(b, TType::Bool, 3);
        binary::write_bool(b, self.start_inclusive);
        binary::write_field(b, TType::Bool, 4);
        binary::write_bool(b, self.stop_inclusive);
        binary::write_field(b, TType::I32, 5);
        b.put_i32(self.batch_size);
        binary::write_field(b, TType::Bool, 6);
        binary::write_bool(b, self.no_value);
        binary::write_field(b, TType::I64, 7);
        b.put_i64(self.min_timestamp_ms);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.start_key = binary::read_bytes(b)?,
                (2, TType::Binary) => m.stop_key = binary::read_bytes(b)?,
                (3, TType::Bool) => m.start_inclusive = binary::read_bool(b)?,
                (4, TType::Bool) => m.stop_inclusive = binary::read_bool(b)?,
                (5, TType::I32) => m.batch_size = binary::read_i32(b)?,
                (6, TType::Bool) => m.no_value = binary::read_bool(b)?,
                (7, TType::I64) => m.min_timestamp_ms = binary::read_i64(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Argument of `scan` (continue) and `scan_cancel`.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub context_id: i64,
}

impl Message for ScanRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I64, 1);
        b.put_i64(self.context_id);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I64) => m.context_id = binary::read_i64(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// Result of `get_scanner` and `scan`: one batch of records plus the
/// context to resume from, or [`SCAN_CONTEXT_COMPLETE`].
#[derive(Debug, Clone, Default)]
pub struct ScanResponse {
    pub error: i32,
    pub kvs: Vec<KeyValue>,
    pub context_id: i64,
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl Message for ScanResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.error);
        write_kv_list(b, 2, &self.kvs);
        binary::write_field(b, TType::I64, 3);
        b.put_i64(self.context_id);
        binary::write_field(b, TType::I32, 4);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 5);
        b.put_i32(self.partition_index);
        binary::write_field(b, TType::Binary, 6);
        binary::write_str(b, &self.server);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.error = binary::read_i32(b)?,
                (2, TType::List) => m.kvs = read_kv_list(b)?,
                (3, TType::I64) => m.context_id = binary::read_i64(b)?,
                (4, TType::I32) => m.app_id = binary::read_i32(b)?,
                (5, TType::I32) => m.partition_index = binary::read_i32(b)?,
                (6, TType::Binary) => m.server = binary::read_string(b)?,
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}
