//! Range scans: a pull-based cursor over one or more partitions.
//!
//! Each cursor owns its request state and advances monotonically: either
//! the server hands back a context id to resume from, or the cursor
//! restarts a fresh range scan from the last key it delivered. A cursor
//! that has finished keeps answering with the end sentinel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use proto_pegasus::rrdb::{
    GetScannerRequest, KeyValue, ScanRequest, ScanResponse, METHOD_GET_SCANNER, METHOD_SCAN,
    METHOD_SCAN_CANCEL,
};
use proto_pegasus::Status;

use crate::codec;
use crate::executor::Executor;
use crate::table::TableHandle;
use crate::{Error, Result};

/// Options accepted by the scanner constructors.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Records fetched per scan round-trip.
    pub batch_size: u32,
    pub start_inclusive: bool,
    pub stop_inclusive: bool,
    /// Project sort keys only; values come back empty.
    pub no_value: bool,
    /// Skip records last written before this wall-clock time, in ms since
    /// the epoch. Zero disables the filter.
    pub min_timestamp_ms: i64,
    /// Deadline for each scan round-trip; `None` uses the client default.
    pub timeout: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            batch_size: 100,
            start_inclusive: true,
            stop_inclusive: false,
            no_value: false,
            min_timestamp_ms: 0,
            timeout: None,
        }
    }
}

/// One record yielded by a scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub hash_key: Bytes,
    pub sort_key: Bytes,
    pub value: Bytes,
}

pub struct Scanner {
    executor: Arc<Executor>,
    table: TableHandle,
    options: ScanOptions,
    /// Partitions still to drain after the current one.
    partitions: VecDeque<u32>,
    current: Option<u32>,
    /// Range template applied to each partition in turn.
    range_start: Bytes,
    range_stop: Bytes,
    /// Continuation state within the current partition.
    cursor_start: Bytes,
    start_inclusive: bool,
    context_id: Option<i64>,
    batch: VecDeque<KeyValue>,
    done: bool,
}

impl Scanner {
    /// A cursor over one hash key's sort-key range; it lives entirely on
    /// the partition that hash key routes to.
    pub(crate) fn bounded(
        executor: Arc<Executor>,
        table: TableHandle,
        hash_key: &[u8],
        start_sort: &[u8],
        stop_sort: &[u8],
        options: ScanOptions,
    ) -> Result<Scanner> {
        let start_key = codec::encode_key(hash_key, start_sort)?;
        let stop_key = if stop_sort.is_empty() {
            codec::encode_hash_key_upper_bound(hash_key)?
        } else {
            codec::encode_key(hash_key, stop_sort)?
        };
        // A range that starts past its stop is born exhausted.
        let done = !stop_key.is_empty()
            && codec::byte_compare(&start_key, &stop_key) == std::cmp::Ordering::Greater;

        let hash = codec::partition_hash(&start_key);
        let partition = codec::partition_index(hash, table.partition_count());
        Ok(Scanner::new(
            executor,
            table,
            VecDeque::from([partition]),
            start_key,
            stop_key,
            options,
            done,
        ))
    }

    /// Splits a whole-table scan into at most `max_split_count` independent
    /// cursors. Partitions are dealt round-robin into the buckets; each
    /// cursor drains its partitions sequentially over the full key range,
    /// so the union of the cursors covers the table exactly once.
    pub(crate) fn split(
        executor: Arc<Executor>,
        table: TableHandle,
        max_split_count: usize,
        options: ScanOptions,
    ) -> Result<Vec<Scanner>> {
        if max_split_count == 0 {
            return Err(Error::InvalidArgument(
                "max_split_count must be at least 1".into(),
            ));
        }
        let partition_count = table.partition_count();
        let buckets = max_split_count.min(partition_count as usize);
        let mut assignments: Vec<VecDeque<u32>> = vec![VecDeque::new(); buckets];
        for partition in 0..partition_count {
            assignments[partition as usize % buckets].push_back(partition);
        }

        let full_start = codec::encode_key(b"", b"")?;
        Ok(assignments
            .into_iter()
            .map(|partitions| {
                Scanner::new(
                    executor.clone(),
                    table.clone(),
                    partitions,
                    full_start.clone(),
                    Bytes::new(),
                    options.clone(),
                    false,
                )
            })
            .collect())
    }

    fn new(
        executor: Arc<Executor>,
        table: TableHandle,
        partitions: VecDeque<u32>,
        range_start: Bytes,
        range_stop: Bytes,
        options: ScanOptions,
        done: bool,
    ) -> Scanner {
        let cursor_start = range_start.clone();
        let start_inclusive = options.start_inclusive;
        Scanner {
            executor,
            table,
            options,
            partitions,
            current: None,
            range_start,
            range_stop,
            cursor_start,
            start_inclusive,
            context_id: None,
            batch: VecDeque::new(),
            done,
        }
    }

    /// Yields the next record, or `None` once the scan is exhausted.
    /// Exhaustion is final: every later call answers `None` again.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(kv) = self.batch.pop_front() {
                let (hash_key, sort_key) = codec::decode_key(kv.key)?;
                return Ok(Some(Row {
                    hash_key,
                    sort_key,
                    value: kv.value,
                }));
            }
            let Some(partition) = self.current else {
                self.advance_partition();
                continue;
            };
            self.fetch(partition).await?;
        }
    }

    async fn fetch(&mut self, partition: u32) -> Result<()> {
        let response: ScanResponse = match self.context_id {
            Some(context_id) => {
                let request = ScanRequest { context_id };
                let response: ScanResponse = self
                    .executor
                    .call_partition(
                        &self.table,
                        METHOD_SCAN,
                        partition,
                        &request,
                        self.options.timeout,
                    )
                    .await?;
                if Status::from_i32(response.error) == Status::NotFound {
                    // The server expired our context. Restart a range scan
                    // from the last delivered key; the cursor stays monotone.
                    tracing::debug!(partition, context_id, "scan context expired, restarting");
                    self.context_id = None;
                    return Ok(());
                }
                response
            }
            None => {
                let request = GetScannerRequest {
                    start_key: self.cursor_start.clone(),
                    stop_key: self.range_stop.clone(),
                    start_inclusive: self.start_inclusive,
                    stop_inclusive: self.options.stop_inclusive,
                    batch_size: self.options.batch_size as i32,
                    no_value: self.options.no_value,
                    min_timestamp_ms: self.options.min_timestamp_ms,
                };
                self.executor
                    .call_partition(
                        &self.table,
                        METHOD_GET_SCANNER,
                        partition,
                        &request,
                        self.options.timeout,
                    )
                    .await?
            }
        };

        match Status::from_i32(response.error) {
            Status::Ok => {}
            status => return Err(Error::Application(status)),
        }

        let complete = response.context_id < 0;
        self.context_id = (!complete).then_some(response.context_id);
        if let Some(last) = response.kvs.last() {
            self.cursor_start = last.key.clone();
            self.start_inclusive = false;
        }
        let empty = response.kvs.is_empty();
        self.batch.extend(response.kvs);

        // The buffered batch still drains before the cursor moves on.
        if complete || (empty && self.context_id.is_none()) {
            self.current = None;
        }
        Ok(())
    }

    fn advance_partition(&mut self) {
        match self.partitions.pop_front() {
            Some(partition) => {
                self.current = Some(partition);
                self.cursor_start = self.range_start.clone();
                self.start_inclusive = self.options.start_inclusive;
                self.context_id = None;
            }
            None => self.done = true,
        }
    }

    /// Ends the scan early and releases any server-side context, best
    /// effort. Later `next` calls answer the end sentinel.
    pub async fn close(&mut self) {
        if let (Some(context_id), Some(partition)) = (self.context_id.take(), self.current) {
            let request = ScanRequest { context_id };
            let cancelled: Result<ScanResponse> = self
                .executor
                .call_partition(
                    &self.table,
                    METHOD_SCAN_CANCEL,
                    partition,
                    &request,
                    self.options.timeout,
                )
                .await;
            if let Err(err) = cancelled {
                tracing::debug!(partition, context_id, %err, "scan cancel failed");
            }
        }
        self.done = true;
        self.batch.clear();
        self.partitions.clear();
        self.current = None;
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        // A cursor abandoned mid-scan still releases its server context,
        // best effort, without blocking the dropper.
        if let (Some(context_id), Some(partition)) = (self.context_id.take(), self.current) {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                return;
            };
            let executor = self.executor.clone();
            let table = self.table.clone();
            let timeout = self.options.timeout;
            handle.spawn(async move {
                let request = ScanRequest { context_id };
                let _: Result<ScanResponse> = executor
                    .call_partition(&table, METHOD_SCAN_CANCEL, partition, &request, timeout)
                    .await;
            });
        }
    }
}
