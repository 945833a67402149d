//! Table handles: a table name bound to its partition-table snapshot.

use std::sync::{Arc, RwLock};

use proto_pegasus::{Gpid, RpcAddress};

use crate::codec;
use crate::meta::{MetaResolver, PartitionTable};
use crate::{Error, Result};

/// A handle on one open table. Cheap to clone; all clones share the same
/// snapshot, which is swapped atomically when a refresh lands. Readers
/// always see a consistent snapshot and are never blocked by a refresh.
#[derive(Clone)]
pub struct TableHandle {
    inner: Arc<TableInner>,
}

struct TableInner {
    name: String,
    resolver: Arc<MetaResolver>,
    map: RwLock<Arc<PartitionTable>>,
    // Admits one resolver round-trip at a time. Latecomers queue here and
    // find the fresh snapshot already in place when they get the lock.
    refresh: tokio::sync::Mutex<()>,
}

impl TableHandle {
    pub(crate) async fn open(name: &str, resolver: Arc<MetaResolver>) -> Result<TableHandle> {
        let table = resolver.query(name).await?;
        tracing::debug!(table = name, partitions = table.partition_count, "opened table");
        Ok(TableHandle {
            inner: Arc::new(TableInner {
                name: name.to_string(),
                resolver,
                map: RwLock::new(Arc::new(table)),
                refresh: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn partition_count(&self) -> u32 {
        self.snapshot().partition_count
    }

    pub(crate) fn snapshot(&self) -> Arc<PartitionTable> {
        self.inner.map.read().unwrap().clone()
    }

    /// Routes a partition hash to (gpid, primary, snapshot version).
    /// Routing depends only on the hash and the partition count: equal
    /// hashes always land on equal partitions within one snapshot.
    pub(crate) fn route_hash(&self, hash: u64) -> (Gpid, RpcAddress, u64) {
        let snapshot = self.snapshot();
        let index = codec::partition_index(hash, snapshot.partition_count);
        self.target(&snapshot, index)
    }

    /// Routes an explicit partition index, used by scans.
    pub(crate) fn route_index(&self, index: u32) -> Result<(Gpid, RpcAddress, u64)> {
        let snapshot = self.snapshot();
        if index >= snapshot.partition_count {
            return Err(Error::Protocol("partition index out of range"));
        }
        Ok(self.target(&snapshot, index))
    }

    fn target(&self, snapshot: &PartitionTable, index: u32) -> (Gpid, RpcAddress, u64) {
        let gpid = Gpid {
            app_id: snapshot.table_id,
            partition_index: index as i32,
        };
        let primary = snapshot.partitions[index as usize].primary;
        (gpid, primary, snapshot.version)
    }

    /// Re-resolves the partition table after a routing error. Callers that
    /// raced an already-completed refresh (the snapshot moved past
    /// `observed_version`) return without another round-trip; everyone
    /// else coalesces behind one in-flight query.
    pub(crate) async fn refresh(&self, observed_version: u64) -> Result<()> {
        let _guard = self.inner.refresh.lock().await;
        if self.snapshot().version > observed_version {
            return Ok(());
        }
        let fresh = self.inner.resolver.query(&self.inner.name).await?;
        let mut map = self.inner.map.write().unwrap();
        // Snapshots only move forward.
        if fresh.version >= map.version {
            tracing::debug!(table = %self.inner.name, version = fresh.version, "partition table refreshed");
            *map = Arc::new(fresh);
        }
        Ok(())
    }
}
