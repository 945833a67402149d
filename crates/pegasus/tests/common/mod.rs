//! An in-process server speaking the client's wire protocol, for driving
//! the full stack over real sockets.

#![allow(dead_code)] // each test binary uses its own subset

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use proto_pegasus::binary::Message;
use proto_pegasus::envelope::{self, Request};
use proto_pegasus::meta::{PartitionConfiguration, QueryCfgResponse};
use proto_pegasus::{ErrCode, Gpid, RpcAddress};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Maps one request to one reply frame; `None` swallows the request,
/// leaving the caller to its deadline.
pub type Handler = Arc<dyn Fn(&Request) -> Option<Bytes> + Send + Sync>;

/// Routes client traces to stderr when RUST_LOG asks for them.
pub fn init_tracing() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub struct MockServer {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// Binds first and hands the bound address to the handler factory, so
    /// handlers can advertise the server as its own replica.
    pub async fn spawn<F>(factory: F) -> MockServer
    where
        F: FnOnce(SocketAddr) -> Handler,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = factory(addr);
        let calls = Arc::new(Mutex::new(Vec::new()));

        let accept_calls = calls.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(stream, handler.clone(), accept_calls.clone()));
            }
        });
        MockServer { addr, calls }
    }

    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// How many requests of `method` this server has seen.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }
}

async fn serve(mut stream: TcpStream, handler: Handler, calls: Arc<Mutex<Vec<String>>>) {
    loop {
        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut frame = vec![0u8; len];
        if stream.read_exact(&mut frame).await.is_err() {
            return;
        }
        let request = envelope::decode_request(Bytes::from(frame)).unwrap();
        calls.lock().unwrap().push(request.method.clone());
        if let Some(reply) = handler(&request) {
            if stream.write_all(&reply).await.is_err() {
                return;
            }
        }
    }
}

pub fn reply<M: Message>(request: &Request, err: ErrCode, body: Option<&M>) -> Option<Bytes> {
    Some(envelope::encode_reply(&request.method, request.seqid, err, body))
}

/// A `query_cfg` answer pointing every partition at `primary`.
pub fn config_reply(
    request: &Request,
    app_id: i32,
    partition_count: i32,
    ballot: i64,
    primary: RpcAddress,
) -> Option<Bytes> {
    let response = QueryCfgResponse {
        err: 0,
        app_id,
        partition_count,
        is_stateful: true,
        partitions: (0..partition_count)
            .map(|partition_index| PartitionConfiguration {
                pid: Gpid {
                    app_id,
                    partition_index,
                },
                ballot,
                primary,
                secondaries: Vec::new(),
            })
            .collect(),
        forward_address: RpcAddress::INVALID,
    };
    reply(request, ErrCode::Ok, Some(&response))
}

pub fn rpc_address_of(addr: SocketAddr) -> RpcAddress {
    match addr {
        SocketAddr::V4(v4) => RpcAddress::new(*v4.ip(), v4.port()),
        SocketAddr::V6(_) => panic!("tests only speak ipv4"),
    }
}

pub fn decode_body<M: Message>(request: &Request) -> M {
    let mut body = request.body.clone();
    M::read(&mut body).unwrap()
}

/// A localhost port with nothing listening on it.
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}
