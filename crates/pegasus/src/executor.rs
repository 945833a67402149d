//! Executes one logical operation: route, dispatch, classify, retry.

use std::time::Duration;

use exponential_backoff::Backoff;
use proto_pegasus::binary::Message;
use proto_pegasus::envelope::RequestHeader;
use tokio::time::Instant;

use crate::config::ClientOptions;
use crate::pool::SessionPool;
use crate::table::TableHandle;
use crate::{Error, Result};

const BACKOFF_MIN: Duration = Duration::from_millis(10);
const BACKOFF_MAX: Duration = Duration::from_secs(1);
// How long one retry waits for a coalesced partition-table refresh before
// having another go with whatever snapshot is current.
const REFRESH_WAIT: Duration = Duration::from_secs(1);

pub(crate) struct Executor {
    pool: SessionPool,
    default_timeout: Duration,
    max_transport_retries: u32,
    perf_counters: bool,
    perf_counter_tags: String,
}

#[derive(Clone, Copy)]
enum Target {
    Hash(u64),
    Partition(u32),
}

impl Executor {
    pub(crate) fn new(pool: SessionPool, options: &ClientOptions) -> Executor {
        Executor {
            pool,
            default_timeout: options.operation_timeout,
            max_transport_retries: options.max_transport_retries,
            perf_counters: options.enable_perf_counter,
            perf_counter_tags: options.perf_counter_tags.clone(),
        }
    }

    /// Routes by partition hash; the common path for keyed operations.
    pub(crate) async fn call_hash<Req: Message, Resp: Message>(
        &self,
        table: &TableHandle,
        method: &'static str,
        hash: u64,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp> {
        self.call(table, method, Target::Hash(hash), request, timeout)
            .await
    }

    /// Routes by explicit partition index; used by the scan engine.
    pub(crate) async fn call_partition<Req: Message, Resp: Message>(
        &self,
        table: &TableHandle,
        method: &'static str,
        partition: u32,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp> {
        self.call(table, method, Target::Partition(partition), request, timeout)
            .await
    }

    async fn call<Req: Message, Resp: Message>(
        &self,
        table: &TableHandle,
        method: &'static str,
        target: Target,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp> {
        let timeout = match timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => self.default_timeout,
        };
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new(self.max_transport_retries, BACKOFF_MIN, Some(BACKOFF_MAX));
        let mut transport_errors = 0u32;

        if self.perf_counters {
            metrics::counter!(
                "pegasus_client_requests",
                "table" => table.name().to_string(),
                "method" => method,
                "tags" => self.perf_counter_tags.clone(),
            )
            .increment(1);
        }

        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }

            let (gpid, primary, version) = match target {
                Target::Hash(hash) => table.route_hash(hash),
                Target::Partition(index) => table.route_index(index)?,
            };
            if primary.is_invalid() {
                // No primary elected yet, or we raced a failover.
                self.await_refresh(table, version, deadline).await?;
                sleep_capped(BACKOFF_MIN, deadline).await;
                continue;
            }

            let session = self.pool.get(&primary.to_string())?;
            let header = RequestHeader {
                gpid,
                partition_hash: match target {
                    Target::Hash(hash) => hash,
                    Target::Partition(_) => 0,
                },
                timeout_ms: deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u32,
            };

            match session.call(method, header, request, deadline).await {
                Ok(reply) => {
                    let code = reply.err;
                    if code == proto_pegasus::ErrCode::Ok {
                        let mut body = reply.body;
                        return Ok(Resp::read(&mut body)?);
                    }
                    if code.is_routing_stale() {
                        tracing::debug!(
                            table = %table.name(), method, partition = gpid.partition_index, %code,
                            "routing is stale, refreshing partition table"
                        );
                        if self.perf_counters {
                            metrics::counter!(
                                "pegasus_client_stale_routes",
                                "table" => table.name().to_string(),
                                "tags" => self.perf_counter_tags.clone(),
                            )
                            .increment(1);
                        }
                        self.await_refresh(table, version, deadline).await?;
                        continue;
                    }
                    if code.is_transient() {
                        transport_errors += 1;
                        match backoff.next(transport_errors) {
                            Some(delay) => sleep_capped(delay, deadline).await,
                            None => return Err(Error::Server(code)),
                        }
                        continue;
                    }
                    return Err(Error::Server(code));
                }
                Err(err) if err.is_transport() => {
                    transport_errors += 1;
                    tracing::warn!(
                        table = %table.name(), method, %err, attempt = transport_errors,
                        "transport error, will retry"
                    );
                    match backoff.next(transport_errors) {
                        Some(delay) => sleep_capped(delay, deadline).await,
                        None => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Waits briefly for a partition-table refresh. A refresh that is slow
    /// or failing does not sink the operation: we retry with the snapshot
    /// we have until the deadline rules.
    async fn await_refresh(
        &self,
        table: &TableHandle,
        observed_version: u64,
        deadline: Instant,
    ) -> Result<()> {
        let wait = REFRESH_WAIT.min(deadline.saturating_duration_since(Instant::now()));
        match tokio::time::timeout(wait, table.refresh(observed_version)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err @ Error::Server(proto_pegasus::ErrCode::AppNotExist))) => Err(err),
            Ok(Err(err)) => {
                tracing::warn!(table = %table.name(), %err, "partition table refresh failed");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

async fn sleep_capped(delay: Duration, deadline: Instant) {
    let capped = delay.min(deadline.saturating_duration_since(Instant::now()));
    if !capped.is_zero() {
        tokio::time::sleep(capped).await;
    }
}
