//! The meta protocol: one method, `query_cfg`, answering which replica is
//! primary for each partition of a table.

use crate::binary::{self, Message, TType};
use crate::{Gpid, RpcAddress, WireError};
use bytes::{BufMut, Bytes, BytesMut};

pub const METHOD_QUERY_CFG: &str = "query_cfg";

/// Asks a meta server for a table's partition map. An empty
/// `partition_indices` list requests every partition.
#[derive(Debug, Clone, Default)]
pub struct QueryCfgRequest {
    pub app_name: String,
    pub partition_indices: Vec<i32>,
}

impl Message for QueryCfgRequest {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Binary, 1);
        binary::write_str(b, &self.app_name);
        binary::write_field(b, TType::List, 2);
        binary::write_list_header(b, TType::I32, self.partition_indices.len());
        for index in &self.partition_indices {
            b.put_i32(*index);
        }
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Binary) => m.app_name = binary::read_string(b)?,
                (2, TType::List) => {
                    let (elem, n) = binary::read_list_header(b)?;
                    if elem != TType::I32 {
                        return Err(WireError::BadType(elem as u8));
                    }
                    m.partition_indices = Vec::with_capacity(n.min(1024));
                    for _ in 0..n {
                        m.partition_indices.push(binary::read_i32(b)?);
                    }
                }
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// One partition's configuration: its current primary and the ballot (term
/// number) under which that primary was elected.
#[derive(Debug, Clone, Default)]
pub struct PartitionConfiguration {
    pub pid: Gpid,
    pub ballot: i64,
    pub primary: RpcAddress,
    pub secondaries: Vec<RpcAddress>,
}

impl Message for PartitionConfiguration {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::Struct, 1);
        {
            binary::write_field(b, TType::I32, 1);
            b.put_i32(self.pid.app_id);
            binary::write_field(b, TType::I32, 2);
            b.put_i32(self.pid.partition_index);
            binary::write_stop(b);
        }
        binary::write_field(b, TType::I64, 2);
        b.put_i64(self.ballot);
        binary::write_field(b, TType::I64, 3);
        b.put_i64(self.primary.as_u64() as i64);
        binary::write_field(b, TType::List, 4);
        binary::write_list_header(b, TType::I64, self.secondaries.len());
        for addr in &self.secondaries {
            b.put_i64(addr.as_u64() as i64);
        }
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::Struct) => {
                    while let Some((t, id)) = binary::read_field(b)? {
                        match (id, t) {
                            (1, TType::I32) => m.pid.app_id = binary::read_i32(b)?,
                            (2, TType::I32) => m.pid.partition_index = binary::read_i32(b)?,
                            (_, t) => binary::skip(b, t)?,
                        }
                    }
                }
                (2, TType::I64) => m.ballot = binary::read_i64(b)?,
                (3, TType::I64) => m.primary = RpcAddress::from_u64(binary::read_i64(b)? as u64),
                (4, TType::List) => {
                    let (elem, n) = binary::read_list_header(b)?;
                    if elem != TType::I64 {
                        return Err(WireError::BadType(elem as u8));
                    }
                    m.secondaries = Vec::with_capacity(n.min(1024));
                    for _ in 0..n {
                        m.secondaries
                            .push(RpcAddress::from_u64(binary::read_i64(b)? as u64));
                    }
                }
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

/// The meta server's answer. `err` of ForwardToOthers means this meta is
/// not the leader; `forward_address`, when set, names the one to try.
#[derive(Debug, Clone, Default)]
pub struct QueryCfgResponse {
    pub err: i32,
    pub app_id: i32,
    pub partition_count: i32,
    pub is_stateful: bool,
    pub partitions: Vec<PartitionConfiguration>,
    pub forward_address: RpcAddress,
}

impl Message for QueryCfgResponse {
    fn write(&self, b: &mut BytesMut) {
        binary::write_field(b, TType::I32, 1);
        b.put_i32(self.err);
        binary::write_field(b, TType::I32, 2);
        b.put_i32(self.app_id);
        binary::write_field(b, TType::I32, 3);
        b.put_i32(self.partition_count);
        binary::write_field(b, TType::Bool, 4);
        binary::write_bool(b, self.is_stateful);
        binary::write_field(b, TType::List, 5);
        binary::write_list_header(b, TType::Struct, self.partitions.len());
        for partition in &self.partitions {
            partition.write(b);
        }
        binary::write_field(b, TType::I64, 6);
        b.put_i64(self.forward_address.as_u64() as i64);
        binary::write_stop(b);
    }

    fn read(b: &mut Bytes) -> Result<Self, WireError> {
        let mut m = Self::default();
        while let Some((t, id)) = binary::read_field(b)? {
            match (id, t) {
                (1, TType::I32) => m.err = binary::read_i32(b)?,
                (2, TType::I32) => m.app_id = binary::read_i32(b)?,
                (3, TType::I32) => m.partition_count = binary::read_i32(b)?,
                (4, TType::Bool) => m.is_stateful = binary::read_bool(b)?,
                (5, TType::List) => {
                    let (elem, n) = binary::read_list_header(b)?;
                    if elem != TType::Struct {
                        return Err(WireError::BadType(elem as u8));
                    }
                    m.partitions = Vec::with_capacity(n.min(1024));
                    for _ in 0..n {
                        m.partitions.push(PartitionConfiguration::read(b)?);
                    }
                }
                (6, TType::I64) => {
                    m.forward_address = RpcAddress::from_u64(binary::read_i64(b)? as u64)
                }
                (_, t) => binary::skip(b, t)?,
            }
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn query_cfg_response_round_trip() {
        let resp = QueryCfgResponse {
            err: 0,
            app_id: 7,
            partition_count: 4,
            is_stateful: true,
            partitions: (0..4)
                .map(|i| PartitionConfiguration {
                    pid: Gpid {
                        app_id: 7,
                        partition_index: i,
                    },
                    ballot: 10 + i as i64,
                    primary: RpcAddress::new(Ipv4Addr::LOCALHOST, 34800 + i as u16),
                    secondaries: vec![RpcAddress::new(Ipv4Addr::LOCALHOST, 34900 + i as u16)],
                })
                .collect(),
            forward_address: RpcAddress::INVALID,
        };

        let mut b = BytesMut::new();
        resp.write(&mut b);
        let mut frozen = b.freeze();
        let out = QueryCfgResponse::read(&mut frozen).unwrap();
        assert!(frozen.is_empty());

        assert_eq!(out.app_id, 7);
        assert_eq!(out.partition_count, 4);
        assert_eq!(out.partitions.len(), 4);
        assert_eq!(out.partitions[2].pid.partition_index, 2);
        assert_eq!(out.partitions[2].ballot, 12);
        assert_eq!(out.partitions[2].primary.port(), 34802);
        assert!(out.forward_address.is_invalid());
    }
}
