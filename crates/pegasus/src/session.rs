//! One duplex TCP connection to a replica or meta endpoint.
//!
//! Outbound and inbound traffic are decoupled: a writer task drains the
//! outbound queue while a reader task matches reply frames to waiters by
//! sequence id. Responses may arrive in any order; only the seqid
//! correlation is guaranteed. Calls issued while the dial is still in
//! flight queue up and drain once the transport is ready.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use proto_pegasus::binary::Message;
use proto_pegasus::envelope::{self, Reply, RequestHeader};
use proto_pegasus::WireError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

const OUTBOUND_QUEUE: usize = 256;

#[derive(Clone)]
pub(crate) struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    queue: mpsc::Sender<Bytes>,
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Reply>>>>,
    next_seqid: AtomicU32,
    failed: AtomicBool,
    cancel: CancellationToken,
}

impl Session {
    /// Creates the session and starts dialing in the background.
    pub(crate) fn connect(addr: String, connect_timeout: Duration) -> Session {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let inner = Arc::new(Inner {
            addr,
            queue: tx,
            pending: Mutex::new(HashMap::new()),
            next_seqid: AtomicU32::new(1),
            failed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        tokio::spawn(run(inner.clone(), rx, connect_timeout));
        Session { inner }
    }

    /// A failed session never recovers; the pool replaces it on demand.
    pub(crate) fn is_failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Sends one request and suspends until its reply, the deadline, or a
    /// connection failure. A reply arriving after the deadline is dropped
    /// by the reader, since the waiter has already detached.
    pub(crate) async fn call<M: Message>(
        &self,
        method: &'static str,
        header: RequestHeader,
        body: &M,
        deadline: Instant,
    ) -> Result<Reply> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(connection_lost(&inner.addr));
        }

        let seqid = inner.next_seqid.fetch_add(1, Ordering::Relaxed);
        let frame = envelope::encode_request(method, seqid, &header, body);

        let (tx, rx) = oneshot::channel();
        inner.pending.lock().unwrap().insert(seqid, tx);

        if inner.queue.send(frame).await.is_err() {
            inner.pending.lock().unwrap().remove(&seqid);
            return Err(connection_lost(&inner.addr));
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(reply)) => reply,
            // Waiter dropped without a drain notice; treat as a reset.
            Ok(Err(_)) => Err(connection_lost(&inner.addr)),
            Err(_) => {
                inner.pending.lock().unwrap().remove(&seqid);
                Err(Error::Timeout)
            }
        }
    }

    /// Cancels reader and writer and fails every pending waiter.
    pub(crate) fn close(&self) {
        self.inner.fail();
    }
}

impl Inner {
    fn fail(&self) {
        self.failed.store(true, Ordering::Release);
        self.cancel.cancel();
        let waiters: Vec<_> = self.pending.lock().unwrap().drain().collect();
        for (_seqid, tx) in waiters {
            let _ = tx.send(Err(connection_lost(&self.addr)));
        }
    }
}

fn connection_lost(addr: &str) -> Error {
    Error::Connection {
        addr: addr.to_string(),
        source: io::Error::new(io::ErrorKind::ConnectionReset, "connection lost"),
    }
}

async fn run(inner: Arc<Inner>, rx: mpsc::Receiver<Bytes>, connect_timeout: Duration) {
    let dialed = tokio::select! {
        _ = inner.cancel.cancelled() => return,
        dialed = tokio::time::timeout(connect_timeout, TcpStream::connect(&inner.addr)) => dialed,
    };
    let stream = match dialed {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            tracing::warn!(addr = %inner.addr, %err, "dial failed");
            inner.fail();
            return;
        }
        Err(_) => {
            tracing::warn!(addr = %inner.addr, "dial timed out");
            inner.fail();
            return;
        }
    };
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(addr = %inner.addr, %err, "failed to set nodelay");
    }
    tracing::debug!(addr = %inner.addr, "session ready");

    let (reader, writer) = stream.into_split();
    tokio::spawn(write_loop(inner.clone(), rx, writer));

    if let Err(err) = read_loop(&inner, reader).await {
        tracing::warn!(addr = %inner.addr, %err, "session read failed");
    }
    inner.fail();
}

async fn write_loop(inner: Arc<Inner>, mut rx: mpsc::Receiver<Bytes>, mut writer: OwnedWriteHalf) {
    loop {
        let frame = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };
        if let Err(err) = writer.write_all(&frame).await {
            tracing::warn!(addr = %inner.addr, %err, "session write failed");
            inner.fail();
            return;
        }
    }
}

async fn read_loop(inner: &Arc<Inner>, mut reader: OwnedReadHalf) -> io::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        tokio::select! {
            _ = inner.cancel.cancelled() => return Ok(()),
            read = reader.read_exact(&mut len_buf) => { read?; }
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > envelope::FRAME_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                WireError::TooLarge(len),
            ));
        }
        let mut frame = vec![0u8; len];
        tokio::select! {
            _ = inner.cancel.cancelled() => return Ok(()),
            read = reader.read_exact(&mut frame) => { read?; }
        }

        let reply = envelope::decode_reply(Bytes::from(frame))
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let waiter = inner.pending.lock().unwrap().remove(&reply.seqid);
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(reply));
            }
            // The caller's deadline already elapsed.
            None => {
                tracing::trace!(addr = %inner.addr, seqid = reply.seqid, "discarding late reply")
            }
        }
    }
}
