//! Request and reply frame assembly.
//!
//! Every message on a session is a `u32` big-endian length prefix followed
//! by that many bytes. A request carries a fixed routing preamble (target
//! gpid, partition hash, timeout), then a strict binary message header
//! naming the method and sequence id, then the argument structure. A reply
//! carries the message header, an envelope [`ErrCode`], and the result
//! structure only when the code is `Ok`.

use crate::binary::{self, Message, MsgType};
use crate::{ErrCode, Gpid, WireError};
use bytes::{BufMut, Bytes, BytesMut};

/// Largest frame either side will accept.
pub const FRAME_MAX: usize = 64 << 20;

/// Routing preamble carried ahead of every request message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeader {
    pub gpid: Gpid,
    pub partition_hash: u64,
    pub timeout_ms: u32,
}

/// A parsed request frame, as seen by a server.
#[derive(Debug)]
pub struct Request {
    pub header: RequestHeader,
    pub method: String,
    pub seqid: u32,
    pub body: Bytes,
}

/// A parsed reply frame, as seen by a client.
#[derive(Debug)]
pub struct Reply {
    pub method: String,
    pub seqid: u32,
    pub err: ErrCode,
    pub body: Bytes,
}

/// Builds a complete request frame, length prefix included.
pub fn encode_request<M: Message>(
    method: &str,
    seqid: u32,
    header: &RequestHeader,
    body: &M,
) -> Bytes {
    let mut b = BytesMut::with_capacity(64);
    b.put_u32(0); // frame length, patched below
    b.put_i32(header.gpid.app_id);
    b.put_i32(header.gpid.partition_index);
    b.put_u64(header.partition_hash);
    b.put_u32(header.timeout_ms);
    binary::write_message_header(&mut b, MsgType::Call, method, seqid);
    body.write(&mut b);
    patch_len(&mut b);
    b.freeze()
}

/// Parses a request frame. `frame` excludes the length prefix.
pub fn decode_request(mut frame: Bytes) -> Result<Request, WireError> {
    let app_id = binary::read_i32(&mut frame)?;
    let partition_index = binary::read_i32(&mut frame)?;
    let partition_hash = binary::read_u64(&mut frame)?;
    let timeout_ms = binary::read_u32(&mut frame)?;
    let (kind, method, seqid) = binary::read_message_header(&mut frame)?;
    if kind != MsgType::Call {
        return Err(WireError::BadHeader);
    }
    Ok(Request {
        header: RequestHeader {
            gpid: Gpid {
                app_id,
                partition_index,
            },
            partition_hash,
            timeout_ms,
        },
        method,
        seqid,
        body: frame,
    })
}

/// Builds a complete reply frame. Non-`Ok` codes travel as thrift
/// exceptions and carry no result structure.
pub fn encode_reply<M: Message>(
    method: &str,
    seqid: u32,
    err: ErrCode,
    body: Option<&M>,
) -> Bytes {
    let kind = if err == ErrCode::Ok {
        MsgType::Reply
    } else {
        MsgType::Exception
    };
    let mut b = BytesMut::with_capacity(64);
    b.put_u32(0);
    binary::write_message_header(&mut b, kind, method, seqid);
    b.put_i32(err as i32);
    if let Some(body) = body {
        body.write(&mut b);
    }
    patch_len(&mut b);
    b.freeze()
}

/// Parses a reply frame. `frame` excludes the length prefix.
pub fn decode_reply(mut frame: Bytes) -> Result<Reply, WireError> {
    let (kind, method, seqid) = binary::read_message_header(&mut frame)?;
    if kind == MsgType::Call {
        return Err(WireError::BadHeader);
    }
    let err = ErrCode::from_i32(binary::read_i32(&mut frame)?);
    Ok(Reply {
        method,
        seqid,
        err,
        body: frame,
    })
}

fn patch_len(b: &mut BytesMut) {
    let len = (b.len() - 4) as u32;
    b[..4].copy_from_slice(&len.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrdb;

    fn strip_len(frame: Bytes) -> Bytes {
        let mut frame = frame;
        let len = binary::read_u32(&mut frame).unwrap() as usize;
        assert_eq!(len, frame.len());
        frame
    }

    #[test]
    fn request_round_trip() {
        let header = RequestHeader {
            gpid: Gpid {
                app_id: 3,
                partition_index: 5,
            },
            partition_hash: 0xdead_beef_0bad_f00d,
            timeout_ms: 750,
        };
        let body = rrdb::KeyRequest {
            key: Bytes::from_static(b"\x00\x02hixy"),
        };
        let frame = encode_request(rrdb::METHOD_GET, 17, &header, &body);

        let req = decode_request(strip_len(frame)).unwrap();
        assert_eq!(req.method, rrdb::METHOD_GET);
        assert_eq!(req.seqid, 17);
        assert_eq!(req.header.gpid.app_id, 3);
        assert_eq!(req.header.gpid.partition_index, 5);
        assert_eq!(req.header.partition_hash, 0xdead_beef_0bad_f00d);
        assert_eq!(req.header.timeout_ms, 750);

        let mut body = req.body;
        let parsed = <rrdb::KeyRequest as Message>::read(&mut body).unwrap();
        assert_eq!(&parsed.key[..], b"\x00\x02hixy");
    }

    #[test]
    fn reply_round_trip() {
        let body = rrdb::ReadResponse {
            error: 0,
            value: Bytes::from_static(b"value"),
            app_id: 3,
            partition_index: 5,
            server: "10.0.0.1:34801".to_string(),
        };
        let frame = encode_reply(rrdb::METHOD_GET, 17, ErrCode::Ok, Some(&body));
        let reply = decode_reply(strip_len(frame)).unwrap();
        assert_eq!(reply.seqid, 17);
        assert_eq!(reply.err, ErrCode::Ok);

        let mut body = reply.body;
        let parsed = <rrdb::ReadResponse as Message>::read(&mut body).unwrap();
        assert_eq!(&parsed.value[..], b"value");
        assert_eq!(parsed.server, "10.0.0.1:34801");
    }

    #[test]
    fn error_reply_is_an_exception_without_body() {
        let frame = encode_reply::<rrdb::ReadResponse>(
            rrdb::METHOD_GET,
            9,
            ErrCode::InvalidState,
            None,
        );
        let reply = decode_reply(strip_len(frame)).unwrap();
        assert_eq!(reply.err, ErrCode::InvalidState);
        assert!(reply.body.is_empty());
    }
}
