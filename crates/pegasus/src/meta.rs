//! The meta resolver: fetches partition maps from the meta servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proto_pegasus::binary::Message;
use proto_pegasus::envelope::RequestHeader;
use proto_pegasus::meta::{QueryCfgRequest, QueryCfgResponse, METHOD_QUERY_CFG};
use proto_pegasus::{ErrCode, RpcAddress};
use tokio::time::Instant;

use crate::pool::SessionPool;
use crate::{Error, Result};

/// A consistent snapshot of one table's partition map. Snapshots are
/// immutable; a refresh builds a new one and swaps the handle's pointer.
#[derive(Debug)]
pub(crate) struct PartitionTable {
    pub table_id: i32,
    pub partition_count: u32,
    /// Sum of partition ballots. Ballots only grow, so the sum orders
    /// genuine refreshes without a version scalar on the wire.
    pub version: u64,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone)]
pub(crate) struct Partition {
    pub ballot: i64,
    pub primary: RpcAddress,
}

pub(crate) struct MetaResolver {
    pool: SessionPool,
    endpoints: Vec<String>,
    cursor: AtomicUsize,
    timeout: Duration,
}

impl MetaResolver {
    pub(crate) fn new(pool: SessionPool, endpoints: Vec<String>, timeout: Duration) -> MetaResolver {
        MetaResolver {
            pool,
            endpoints,
            cursor: AtomicUsize::new(0),
            timeout,
        }
    }

    /// Fetches the current partition map for `table`, rotating through the
    /// meta endpoints on transport errors and forward hints. Gives up after
    /// two passes over the endpoint list.
    #[tracing::instrument(level = "trace", skip(self))]
    pub(crate) async fn query(&self, table: &str) -> Result<PartitionTable> {
        let deadline = Instant::now() + self.timeout;
        let request = QueryCfgRequest {
            app_name: table.to_string(),
            partition_indices: Vec::new(),
        };

        let mut last_err = Error::Timeout;
        for _ in 0..self.endpoints.len() * 2 {
            let index = self.cursor.load(Ordering::Relaxed) % self.endpoints.len();
            let addr = &self.endpoints[index];
            let session = self.pool.get(addr)?;

            let reply = match session
                .call(METHOD_QUERY_CFG, meta_header(self.timeout), &request, deadline)
                .await
            {
                Ok(reply) => reply,
                Err(err) if err.is_transport() => {
                    tracing::debug!(addr, %err, "meta endpoint unreachable");
                    self.rotate(index);
                    last_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            };

            if reply.err != ErrCode::Ok {
                tracing::debug!(addr, code = %reply.err, "meta endpoint rejected query");
                self.rotate(index);
                last_err = Error::Server(reply.err);
                continue;
            }

            let mut body = reply.body;
            let response = QueryCfgResponse::read(&mut body)?;
            match ErrCode::from_i32(response.err) {
                ErrCode::Ok => return build_table(table, response),
                ErrCode::ForwardToOthers => {
                    self.follow_hint(index, response.forward_address);
                    last_err = Error::Server(ErrCode::ForwardToOthers);
                    continue;
                }
                ErrCode::Busy => {
                    self.rotate(index);
                    last_err = Error::Server(ErrCode::Busy);
                    continue;
                }
                code => return Err(Error::Server(code)),
            }
        }
        Err(last_err)
    }

    fn rotate(&self, observed: usize) {
        self.cursor.store(observed + 1, Ordering::Relaxed);
    }

    /// Moves the cursor to the hinted leader when it is one of ours,
    /// otherwise just rotates.
    fn follow_hint(&self, observed: usize, hint: RpcAddress) {
        if !hint.is_invalid() {
            let hinted = hint.to_string();
            if let Some(position) = self.endpoints.iter().position(|e| *e == hinted) {
                tracing::debug!(hint = %hinted, "following meta leader hint");
                self.cursor.store(position, Ordering::Relaxed);
                return;
            }
        }
        self.rotate(observed);
    }
}

fn meta_header(timeout: Duration) -> RequestHeader {
    RequestHeader {
        timeout_ms: timeout.as_millis() as u32,
        ..Default::default()
    }
}

fn build_table(name: &str, response: QueryCfgResponse) -> Result<PartitionTable> {
    let count = response.partition_count;
    if count <= 0 || !(count as u32).is_power_of_two() {
        return Err(Error::Protocol(
            "partition count must be a positive power of two",
        ));
    }
    let count = count as u32;

    let mut partitions = vec![
        Partition {
            ballot: 0,
            primary: RpcAddress::INVALID,
        };
        count as usize
    ];
    for config in response.partitions {
        let index = config.pid.partition_index;
        if index < 0 || index as u32 >= count {
            return Err(Error::Protocol("partition index out of range"));
        }
        partitions[index as usize] = Partition {
            ballot: config.ballot,
            primary: config.primary,
        };
    }

    let version = partitions.iter().map(|p| p.ballot.max(0) as u64).sum();
    tracing::debug!(
        table = name,
        app_id = response.app_id,
        partitions = count,
        version,
        "resolved partition table"
    );
    Ok(PartitionTable {
        table_id: response.app_id,
        partition_count: count,
        version,
        partitions,
    })
}
