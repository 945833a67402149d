//! Thrift-compatible binary protocol primitives.
//!
//! All request and reply bodies on the wire are structures in the thrift
//! strict binary protocol: fixed-width big-endian integers, length-prefixed
//! binaries, and (type, field-id) headers terminated by a stop byte.
//! Readers must skip fields they do not recognize, so that either side of
//! the protocol can grow new fields without breaking the other.

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Thrift wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    Binary = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    pub fn from_u8(v: u8) -> Result<TType, WireError> {
        Ok(match v {
            0 => TType::Stop,
            2 => TType::Bool,
            3 => TType::Byte,
            4 => TType::Double,
            6 => TType::I16,
            8 => TType::I32,
            10 => TType::I64,
            11 => TType::Binary,
            12 => TType::Struct,
            13 => TType::Map,
            14 => TType::Set,
            15 => TType::List,
            other => return Err(WireError::BadType(other)),
        })
    }
}

/// A structure that knows how to write itself to, and read itself from,
/// the binary protocol. Implementations live in [`crate::rrdb`] and
/// [`crate::meta`].
pub trait Message: Sized {
    fn write(&self, b: &mut BytesMut);
    fn read(b: &mut Bytes) -> Result<Self, WireError>;
}

// Strict binary message header: version word, method name, sequence id.
const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

/// Message kinds carried in the header version word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Call = 1,
    Reply = 2,
    Exception = 3,
}

pub fn write_message_header(b: &mut BytesMut, kind: MsgType, method: &str, seqid: u32) {
    b.put_u32(VERSION_1 | kind as u32);
    write_str(b, method);
    b.put_i32(seqid as i32);
}

pub fn read_message_header(b: &mut Bytes) -> Result<(MsgType, String, u32), WireError> {
    let word = read_u32(b)?;
    if word & VERSION_MASK != VERSION_1 {
        return Err(WireError::BadHeader);
    }
    let kind = match word & 0xff {
        1 => MsgType::Call,
        2 => MsgType::Reply,
        3 => MsgType::Exception,
        _ => return Err(WireError::BadHeader),
    };
    let method = read_string(b)?;
    let seqid = read_i32(b)? as u32;
    Ok((kind, method, seqid))
}

pub fn write_field(b: &mut BytesMut, ttype: TType, id: i16) {
    b.put_u8(ttype as u8);
    b.put_i16(id);
}

pub fn write_stop(b: &mut BytesMut) {
    b.put_u8(TType::Stop as u8);
}

/// Reads the next field header; `None` marks the structure's stop byte.
pub fn read_field(b: &mut Bytes) -> Result<Option<(TType, i16)>, WireError> {
    let ttype = TType::from_u8(read_u8(b)?)?;
    if ttype == TType::Stop {
        return Ok(None);
    }
    Ok(Some((ttype, read_i16(b)?)))
}

pub fn write_bytes(b: &mut BytesMut, v: &[u8]) {
    b.put_i32(v.len() as i32);
    b.put_slice(v);
}

pub fn write_str(b: &mut BytesMut, v: &str) {
    write_bytes(b, v.as_bytes());
}

pub fn write_bool(b: &mut BytesMut, v: bool) {
    b.put_u8(v as u8);
}

pub fn write_list_header(b: &mut BytesMut, elem: TType, len: usize) {
    b.put_u8(elem as u8);
    b.put_i32(len as i32);
}

fn need(b: &Bytes, n: usize) -> Result<(), WireError> {
    if b.remaining() < n {
        return Err(WireError::Truncated);
    }
    Ok(())
}

pub fn read_u8(b: &mut Bytes) -> Result<u8, WireError> {
    need(b, 1)?;
    Ok(b.get_u8())
}

pub fn read_bool(b: &mut Bytes) -> Result<bool, WireError> {
    Ok(read_u8(b)? != 0)
}

pub fn read_i16(b: &mut Bytes) -> Result<i16, WireError> {
    need(b, 2)?;
    Ok(b.get_i16())
}

pub fn read_i32(b: &mut Bytes) -> Result<i32, WireError> {
    need(b, 4)?;
    Ok(b.get_i32())
}

pub fn read_u32(b: &mut Bytes) -> Result<u32, WireError> {
    need(b, 4)?;
    Ok(b.get_u32())
}

pub fn read_i64(b: &mut Bytes) -> Result<i64, WireError> {
    need(b, 8)?;
    Ok(b.get_i64())
}

pub fn read_u64(b: &mut Bytes) -> Result<u64, WireError> {
    need(b, 8)?;
    Ok(b.get_u64())
}

pub fn read_bytes(b: &mut Bytes) -> Result<Bytes, WireError> {
    let n = read_i32(b)?;
    if n < 0 {
        return Err(WireError::BadLength);
    }
    need(b, n as usize)?;
    Ok(b.split_to(n as usize))
}

pub fn read_string(b: &mut Bytes) -> Result<String, WireError> {
    let raw = read_bytes(b)?;
    String::from_utf8(raw.to_vec()).map_err(|_| WireError::BadUtf8)
}

pub fn read_list_header(b: &mut Bytes) -> Result<(TType, usize), WireError> {
    let elem = TType::from_u8(read_u8(b)?)?;
    let n = read_i32(b)?;
    if n < 0 {
        return Err(WireError::BadLength);
    }
    Ok((elem, n as usize))
}

/// Skips one value of the given type, recursing into containers.
pub fn skip(b: &mut Bytes, ttype: TType) -> Result<(), WireError> {
    match ttype {
        TType::Stop => Err(WireError::BadType(0)),
        TType::Bool | TType::Byte => {
            read_u8(b)?;
            Ok(())
        }
        TType::I16 => {
            read_i16(b)?;
            Ok(())
        }
        TType::I32 => {
            read_i32(b)?;
            Ok(())
        }
        TType::Double | TType::I64 => {
            read_i64(b)?;
            Ok(())
        }
        TType::Binary => {
            read_bytes(b)?;
            Ok(())
        }
        TType::Struct => {
            while let Some((t, _id)) = read_field(b)? {
                skip(b, t)?;
            }
            Ok(())
        }
        TType::List | TType::Set => {
            let (elem, n) = read_list_header(b)?;
            for _ in 0..n {
                skip(b, elem)?;
            }
            Ok(())
        }
        TType::Map => {
            let key = TType::from_u8(read_u8(b)?)?;
            let value = TType::from_u8(read_u8(b)?)?;
            let n = read_i32(b)?;
            if n < 0 {
                return Err(WireError::BadLength);
            }
            for _ in 0..n {
                skip(b, key)?;
                skip(b, value)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_header_round_trip() {
        let mut b = BytesMut::new();
        write_message_header(&mut b, MsgType::Call, "multi_get", 42);
        let mut frozen = b.freeze();
        let (kind, method, seqid) = read_message_header(&mut frozen).unwrap();
        assert_eq!(kind, MsgType::Call);
        assert_eq!(method, "multi_get");
        assert_eq!(seqid, 42);
        assert!(frozen.is_empty());
    }

    #[test]
    fn rejects_bad_version_word() {
        let mut b = BytesMut::new();
        b.put_u32(0x1234_0001);
        assert!(matches!(
            read_message_header(&mut b.freeze()),
            Err(WireError::BadHeader)
        ));
    }

    #[test]
    fn skips_unknown_fields() {
        let mut b = BytesMut::new();
        write_field(&mut b, TType::I64, 9);
        b.put_i64(-7);
        write_field(&mut b, TType::List, 10);
        write_list_header(&mut b, TType::Binary, 2);
        write_bytes(&mut b, b"aa");
        write_bytes(&mut b, b"bb");
        write_stop(&mut b);

        let mut frozen = b.freeze();
        while let Some((t, _id)) = read_field(&mut frozen).unwrap() {
            skip(&mut frozen, t).unwrap();
        }
        assert!(frozen.is_empty());
    }

    #[test]
    fn truncated_reads_error() {
        let mut b = BytesMut::new();
        b.put_i32(100); // claims 100 bytes of binary payload
        b.put_slice(b"short");
        assert!(matches!(
            read_bytes(&mut b.freeze()),
            Err(WireError::Truncated)
        ));
    }
}
