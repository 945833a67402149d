//! The client facade: named operations over the executor, batch, and scan
//! engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use proto_pegasus::rrdb::{
    self, CountRequest, CountResponse, ErrorResponse, KeyRequest, KeyValue, MultiGetRequest,
    MultiGetResponse, MultiPutRequest, MultiRemoveRequest, MultiRemoveResponse, ReadResponse,
    TtlResponse, UpdateRequest, UpdateResponse,
};
use proto_pegasus::Status;

use crate::batch;
use crate::codec;
use crate::config::ClientOptions;
use crate::executor::Executor;
use crate::meta::MetaResolver;
use crate::pool::SessionPool;
use crate::scan::{ScanOptions, Scanner};
use crate::table::TableHandle;
use crate::{Error, Result};

/// One record for `batch_set`.
#[derive(Debug, Clone)]
pub struct SetItem {
    pub hash_key: Bytes,
    pub sort_key: Bytes,
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

/// One hash key's records for `batch_multi_set`.
#[derive(Debug, Clone)]
pub struct MultiSetItem {
    pub hash_key: Bytes,
    pub kvs: Vec<(Bytes, Bytes)>,
    pub ttl: Option<Duration>,
}

/// One hash key and its sort keys, for `batch_multi_get` and
/// `batch_multi_del`. An empty sort-key list addresses every record under
/// the hash key (reads only).
#[derive(Debug, Clone)]
pub struct MultiKey {
    pub hash_key: Bytes,
    pub sort_keys: Vec<Bytes>,
}

// Table slots follow the double-checked interning shape: a narrow sync map
// of per-name slots, each guarded by an async lock for the slow path.
type TableSlot = Arc<tokio::sync::Mutex<Option<TableHandle>>>;

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pool: SessionPool,
    executor: Arc<Executor>,
    resolver: Arc<MetaResolver>,
    tables: Mutex<HashMap<String, TableSlot>>,
    closed: AtomicBool,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Client> {
        if options.meta_servers.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one meta server is required".into(),
            ));
        }
        let pool = SessionPool::new(options.connect_timeout);
        let resolver = Arc::new(MetaResolver::new(
            pool.clone(),
            options.meta_servers.clone(),
            options.operation_timeout,
        ));
        let executor = Arc::new(Executor::new(pool.clone(), &options));
        Ok(Client {
            inner: Arc::new(ClientInner {
                pool,
                executor,
                resolver,
                tables: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Builds a client straight from the configuration loader's property
    /// map.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Client> {
        Client::new(ClientOptions::from_properties(properties)?)
    }

    /// Returns the interned handle for `name`, resolving its partition map
    /// on first open.
    pub async fn open_table(&self, name: &str) -> Result<TableHandle> {
        self.check_open()?;
        let slot = {
            let mut tables = self.inner.tables.lock().unwrap();
            tables.entry(name.to_string()).or_default().clone()
        };
        let mut slot = slot.lock().await;
        if let Some(handle) = &*slot {
            return Ok(handle.clone());
        }
        let handle = TableHandle::open(name, self.inner.resolver.clone()).await?;
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Closes every session and refuses further calls. Outstanding waiters
    /// complete with a connection error.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.pool.close();
            tracing::debug!("client closed");
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    async fn keyed(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
    ) -> Result<(TableHandle, u64, Bytes)> {
        self.check_open()?;
        let key = codec::encode_key(hash_key, sort_key)?;
        let hash = codec::partition_hash(&key);
        let handle = self.open_table(table).await?;
        Ok((handle, hash, key))
    }

    // Single-key operations ------------------------------------------------

    pub async fn get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>> {
        let (handle, hash, key) = self.keyed(table, hash_key, sort_key).await?;
        let request = KeyRequest { key };
        let response: ReadResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_GET, hash, &request, timeout)
            .await?;
        match Status::from_i32(response.error) {
            Status::Ok => Ok(Some(response.value)),
            Status::NotFound => Ok(None),
            status => Err(Error::Application(status)),
        }
    }

    /// Writes one record. `ttl` of `None` keeps it forever.
    pub async fn set(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let (handle, hash, key) = self.keyed(table, hash_key, sort_key).await?;
        let request = UpdateRequest {
            key,
            value: Bytes::copy_from_slice(value),
            expire_ts_seconds: expire_ts(ttl)?,
        };
        let response: UpdateResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_PUT, hash, &request, timeout)
            .await?;
        check_status(response.error)
    }

    /// Deletes one record; deleting an absent record is not an error.
    pub async fn del(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let (handle, hash, key) = self.keyed(table, hash_key, sort_key).await?;
        let request = KeyRequest { key };
        let response: UpdateResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_REMOVE, hash, &request, timeout)
            .await?;
        match Status::from_i32(response.error) {
            Status::Ok | Status::NotFound => Ok(()),
            status => Err(Error::Application(status)),
        }
    }

    pub async fn exist(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let (handle, hash, key) = self.keyed(table, hash_key, sort_key).await?;
        let request = KeyRequest { key };
        let response: ErrorResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_EXIST, hash, &request, timeout)
            .await?;
        match Status::from_i32(response.error) {
            Status::Ok => Ok(true),
            Status::NotFound => Ok(false),
            status => Err(Error::Application(status)),
        }
    }

    /// Remaining time-to-live of a record, `None` when it never expires.
    /// Asking about an absent record is an application error.
    pub async fn ttl(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Duration>> {
        let (handle, hash, key) = self.keyed(table, hash_key, sort_key).await?;
        let request = KeyRequest { key };
        let response: TtlResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_TTL, hash, &request, timeout)
            .await?;
        match Status::from_i32(response.error) {
            Status::Ok if response.ttl_seconds < 0 => Ok(None),
            Status::Ok => Ok(Some(Duration::from_secs(response.ttl_seconds as u64))),
            status => Err(Error::Application(status)),
        }
    }

    /// Counts the sort keys stored under one hash key.
    pub async fn sortkey_count(
        &self,
        table: &str,
        hash_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<i64> {
        let (handle, hash, _key) = self.keyed(table, hash_key, b"").await?;
        let request = CountRequest {
            hash_key: Bytes::copy_from_slice(hash_key),
        };
        let response: CountResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_SORTKEY_COUNT, hash, &request, timeout)
            .await?;
        check_status(response.error)?;
        Ok(response.count)
    }

    // Multi-key operations -------------------------------------------------

    /// Reads the given sort keys under one hash key; an empty list reads
    /// them all. Yields (sort key, value) pairs. An absent hash key yields
    /// an empty list.
    pub async fn multi_get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Bytes],
        timeout: Option<Duration>,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        let (handle, hash, _key) = self.keyed(table, hash_key, b"").await?;
        let request = MultiGetRequest {
            hash_key: Bytes::copy_from_slice(hash_key),
            sort_keys: sort_keys.to_vec(),
            max_kv_count: 0,
            max_kv_size: 0,
            no_value: false,
        };
        let response: MultiGetResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_MULTI_GET, hash, &request, timeout)
            .await?;
        match Status::from_i32(response.error) {
            Status::Ok => Ok(response
                .kvs
                .into_iter()
                .map(|kv| (kv.key, kv.value))
                .collect()),
            Status::NotFound => Ok(Vec::new()),
            status => Err(Error::Application(status)),
        }
    }

    /// Lists every sort key under one hash key, values elided.
    pub async fn multi_get_sort_keys(
        &self,
        table: &str,
        hash_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Vec<Bytes>> {
        let (handle, hash, _key) = self.keyed(table, hash_key, b"").await?;
        let request = MultiGetRequest {
            hash_key: Bytes::copy_from_slice(hash_key),
            sort_keys: Vec::new(),
            max_kv_count: 0,
            max_kv_size: 0,
            no_value: true,
        };
        let response: MultiGetResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_MULTI_GET, hash, &request, timeout)
            .await?;
        match Status::from_i32(response.error) {
            Status::Ok => Ok(response.kvs.into_iter().map(|kv| kv.key).collect()),
            Status::NotFound => Ok(Vec::new()),
            status => Err(Error::Application(status)),
        }
    }

    /// Writes several records under one hash key atomically.
    pub async fn multi_set(
        &self,
        table: &str,
        hash_key: &[u8],
        kvs: &[(Bytes, Bytes)],
        ttl: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        if kvs.is_empty() {
            return Err(Error::InvalidArgument("multi_set requires records".into()));
        }
        let (handle, hash, _key) = self.keyed(table, hash_key, b"").await?;
        let request = MultiPutRequest {
            hash_key: Bytes::copy_from_slice(hash_key),
            kvs: kvs
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            expire_ts_seconds: expire_ts(ttl)?,
        };
        let response: UpdateResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_MULTI_PUT, hash, &request, timeout)
            .await?;
        check_status(response.error)
    }

    /// Deletes several sort keys under one hash key atomically; yields the
    /// number actually removed.
    pub async fn multi_del(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Bytes],
        timeout: Option<Duration>,
    ) -> Result<i64> {
        if sort_keys.is_empty() {
            return Err(Error::InvalidArgument("multi_del requires sort keys".into()));
        }
        let (handle, hash, _key) = self.keyed(table, hash_key, b"").await?;
        let request = MultiRemoveRequest {
            hash_key: Bytes::copy_from_slice(hash_key),
            sort_keys: sort_keys.to_vec(),
            max_count: 0,
        };
        let response: MultiRemoveResponse = self
            .inner
            .executor
            .call_hash(&handle, rrdb::METHOD_MULTI_REMOVE, hash, &request, timeout)
            .await?;
        check_status(response.error)?;
        Ok(response.count)
    }

    // Batches --------------------------------------------------------------

    /// Reads many independent keys concurrently; the first failure wins.
    pub async fn batch_get(
        &self,
        table: &str,
        keys: &[(Bytes, Bytes)],
        timeout: Option<Duration>,
    ) -> Result<Vec<Option<Bytes>>> {
        self.check_open()?;
        batch::fail_fast(
            keys.iter()
                .map(|(hash_key, sort_key)| self.get(table, hash_key, sort_key, timeout))
                .collect(),
        )
        .await
    }

    /// Like [`Client::batch_get`], but collects every per-key outcome
    /// positionally and reports how many failed.
    pub async fn batch_get2(
        &self,
        table: &str,
        keys: &[(Bytes, Bytes)],
        timeout: Option<Duration>,
    ) -> (Vec<Result<Option<Bytes>>>, usize) {
        if self.check_open().is_err() {
            return (keys.iter().map(|_| Err(Error::Closed)).collect(), keys.len());
        }
        batch::tolerant(
            keys.iter()
                .map(|(hash_key, sort_key)| self.get(table, hash_key, sort_key, timeout))
                .collect(),
        )
        .await
    }

    pub async fn batch_set(
        &self,
        table: &str,
        items: &[SetItem],
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_open()?;
        batch::fail_fast(
            items
                .iter()
                .map(|item| {
                    self.set(
                        table,
                        &item.hash_key,
                        &item.sort_key,
                        &item.value,
                        item.ttl,
                        timeout,
                    )
                })
                .collect(),
        )
        .await?;
        Ok(())
    }

    pub async fn batch_set2(
        &self,
        table: &str,
        items: &[SetItem],
        timeout: Option<Duration>,
    ) -> (Vec<Result<()>>, usize) {
        if self.check_open().is_err() {
            return (items.iter().map(|_| Err(Error::Closed)).collect(), items.len());
        }
        batch::tolerant(
            items
                .iter()
                .map(|item| {
                    self.set(
                        table,
                        &item.hash_key,
                        &item.sort_key,
                        &item.value,
                        item.ttl,
                        timeout,
                    )
                })
                .collect(),
        )
        .await
    }

    pub async fn batch_del(
        &self,
        table: &str,
        keys: &[(Bytes, Bytes)],
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_open()?;
        batch::fail_fast(
            keys.iter()
                .map(|(hash_key, sort_key)| self.del(table, hash_key, sort_key, timeout))
                .collect(),
        )
        .await?;
        Ok(())
    }

    pub async fn batch_del2(
        &self,
        table: &str,
        keys: &[(Bytes, Bytes)],
        timeout: Option<Duration>,
    ) -> (Vec<Result<()>>, usize) {
        if self.check_open().is_err() {
            return (keys.iter().map(|_| Err(Error::Closed)).collect(), keys.len());
        }
        batch::tolerant(
            keys.iter()
                .map(|(hash_key, sort_key)| self.del(table, hash_key, sort_key, timeout))
                .collect(),
        )
        .await
    }

    /// Fans out one `multi_get` per item; each item addresses a single
    /// hash key.
    pub async fn batch_multi_get(
        &self,
        table: &str,
        items: &[MultiKey],
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<(Bytes, Bytes)>>> {
        self.check_open()?;
        batch::fail_fast(
            items
                .iter()
                .map(|item| self.multi_get(table, &item.hash_key, &item.sort_keys, timeout))
                .collect(),
        )
        .await
    }

    pub async fn batch_multi_get2(
        &self,
        table: &str,
        items: &[MultiKey],
        timeout: Option<Duration>,
    ) -> (Vec<Result<Vec<(Bytes, Bytes)>>>, usize) {
        if self.check_open().is_err() {
            return (items.iter().map(|_| Err(Error::Closed)).collect(), items.len());
        }
        batch::tolerant(
            items
                .iter()
                .map(|item| self.multi_get(table, &item.hash_key, &item.sort_keys, timeout))
                .collect(),
        )
        .await
    }

    pub async fn batch_multi_set(
        &self,
        table: &str,
        items: &[MultiSetItem],
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_open()?;
        batch::fail_fast(
            items
                .iter()
                .map(|item| self.multi_set(table, &item.hash_key, &item.kvs, item.ttl, timeout))
                .collect(),
        )
        .await?;
        Ok(())
    }

    pub async fn batch_multi_set2(
        &self,
        table: &str,
        items: &[MultiSetItem],
        timeout: Option<Duration>,
    ) -> (Vec<Result<()>>, usize) {
        if self.check_open().is_err() {
            return (items.iter().map(|_| Err(Error::Closed)).collect(), items.len());
        }
        batch::tolerant(
            items
                .iter()
                .map(|item| self.multi_set(table, &item.hash_key, &item.kvs, item.ttl, timeout))
                .collect(),
        )
        .await
    }

    /// Fans out one `multi_del` per item; yields per-item removal counts.
    pub async fn batch_multi_del(
        &self,
        table: &str,
        items: &[MultiKey],
        timeout: Option<Duration>,
    ) -> Result<Vec<i64>> {
        self.check_open()?;
        batch::fail_fast(
            items
                .iter()
                .map(|item| self.multi_del(table, &item.hash_key, &item.sort_keys, timeout))
                .collect(),
        )
        .await
    }

    pub async fn batch_multi_del2(
        &self,
        table: &str,
        items: &[MultiKey],
        timeout: Option<Duration>,
    ) -> (Vec<Result<i64>>, usize) {
        if self.check_open().is_err() {
            return (items.iter().map(|_| Err(Error::Closed)).collect(), items.len());
        }
        batch::tolerant(
            items
                .iter()
                .map(|item| self.multi_del(table, &item.hash_key, &item.sort_keys, timeout))
                .collect(),
        )
        .await
    }

    // Scans ----------------------------------------------------------------

    /// Opens a cursor over one hash key's sort-key range. An empty
    /// `stop_sort` scans to the end of the hash key.
    pub async fn get_scanner(
        &self,
        table: &str,
        hash_key: &[u8],
        start_sort: &[u8],
        stop_sort: &[u8],
        options: ScanOptions,
    ) -> Result<Scanner> {
        self.check_open()?;
        let handle = self.open_table(table).await?;
        Scanner::bounded(
            self.inner.executor.clone(),
            handle,
            hash_key,
            start_sort,
            stop_sort,
            options,
        )
    }

    /// Splits a whole-table scan into independent cursors the caller may
    /// drain in parallel. At most `max_split_count` cursors are returned.
    pub async fn get_unordered_scanners(
        &self,
        table: &str,
        max_split_count: usize,
        options: ScanOptions,
    ) -> Result<Vec<Scanner>> {
        self.check_open()?;
        let handle = self.open_table(table).await?;
        Scanner::split(self.inner.executor.clone(), handle, max_split_count, options)
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.pool.close();
    }
}

fn check_status(error: i32) -> Result<()> {
    match Status::from_i32(error) {
        Status::Ok => Ok(()),
        status => Err(Error::Application(status)),
    }
}

fn expire_ts(ttl: Option<Duration>) -> Result<i32> {
    let Some(ttl) = ttl else { return Ok(0) };
    if ttl.is_zero() {
        return Err(Error::InvalidArgument("ttl must be positive".into()));
    }
    let seconds = ttl.as_secs().max(1);
    if seconds > i32::MAX as u64 {
        return Err(Error::InvalidArgument("ttl exceeds the representable range".into()));
    }
    Ok(seconds as i32)
}
