//! A blocking facade for callers without an async runtime of their own.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::client::Client;
use crate::config::ClientOptions;
use crate::{Error, Result};

/// Owns a multi-threaded runtime sized by `async_workers` and wraps the
/// common operations as blocking calls. Must not be used from inside
/// another tokio runtime.
pub struct SyncClient {
    runtime: tokio::runtime::Runtime,
    client: Client,
}

impl SyncClient {
    pub fn new(options: ClientOptions) -> Result<SyncClient> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.async_workers.max(1))
            .thread_name("pegasus-client")
            .enable_io()
            .enable_time()
            .build()
            .map_err(Error::Runtime)?;
        let client = Client::new(options)?;
        Ok(SyncClient { runtime, client })
    }

    pub fn from_properties(properties: &HashMap<String, String>) -> Result<SyncClient> {
        SyncClient::new(ClientOptions::from_properties(properties)?)
    }

    /// The async client sharing this runtime, for callers that need the
    /// full surface.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>> {
        self.runtime
            .block_on(self.client.get(table, hash_key, sort_key, timeout))
    }

    pub fn set(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.runtime.block_on(
            self.client
                .set(table, hash_key, sort_key, value, ttl, timeout),
        )
    }

    pub fn del(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.runtime
            .block_on(self.client.del(table, hash_key, sort_key, timeout))
    }

    pub fn exist(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<bool> {
        self.runtime
            .block_on(self.client.exist(table, hash_key, sort_key, timeout))
    }

    pub fn ttl(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Duration>> {
        self.runtime
            .block_on(self.client.ttl(table, hash_key, sort_key, timeout))
    }

    pub fn multi_get(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Bytes],
        timeout: Option<Duration>,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        self.runtime
            .block_on(self.client.multi_get(table, hash_key, sort_keys, timeout))
    }

    pub fn multi_set(
        &self,
        table: &str,
        hash_key: &[u8],
        kvs: &[(Bytes, Bytes)],
        ttl: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.runtime
            .block_on(self.client.multi_set(table, hash_key, kvs, ttl, timeout))
    }

    pub fn multi_del(
        &self,
        table: &str,
        hash_key: &[u8],
        sort_keys: &[Bytes],
        timeout: Option<Duration>,
    ) -> Result<i64> {
        self.runtime
            .block_on(self.client.multi_del(table, hash_key, sort_keys, timeout))
    }

    pub fn close(&self) {
        self.client.close();
    }
}
