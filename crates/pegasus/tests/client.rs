mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use common::*;
use pegasus::{Client, ClientOptions, Error};
use proto_pegasus::rrdb::{
    CountRequest, CountResponse, ErrorResponse, KeyRequest, KeyValue, MultiGetRequest,
    MultiGetResponse, MultiPutRequest, MultiRemoveRequest, MultiRemoveResponse, ReadResponse,
    UpdateRequest, UpdateResponse, METHOD_EXIST, METHOD_GET, METHOD_MULTI_GET, METHOD_MULTI_PUT,
    METHOD_MULTI_REMOVE, METHOD_PUT, METHOD_REMOVE, METHOD_SORTKEY_COUNT,
};
use proto_pegasus::meta::METHOD_QUERY_CFG;
use proto_pegasus::ErrCode;

fn options(meta_servers: Vec<String>) -> ClientOptions {
    let mut options = ClientOptions::new(meta_servers);
    options.operation_timeout = Duration::from_secs(5);
    options
}

/// A handler backed by a flat (encoded key -> value) store, serving the
/// single-key methods plus `query_cfg`.
fn kv_handler(addr: std::net::SocketAddr) -> Handler {
    let primary = rpc_address_of(addr);
    let store: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>> = Arc::default();

    Arc::new(move |request| {
        let mut store = store.lock().unwrap();
        match request.method.as_str() {
            METHOD_QUERY_CFG => config_reply(request, 1, 4, 3, primary),
            METHOD_PUT => {
                let body: UpdateRequest = decode_body(request);
                store.insert(body.key.to_vec(), body.value.to_vec());
                reply(request, ErrCode::Ok, Some(&UpdateResponse::default()))
            }
            METHOD_GET => {
                let body: KeyRequest = decode_body(request);
                let response = match store.get(&body.key[..]) {
                    Some(value) => ReadResponse {
                        error: 0,
                        value: Bytes::copy_from_slice(value),
                        ..Default::default()
                    },
                    None => ReadResponse {
                        error: 1,
                        ..Default::default()
                    },
                };
                reply(request, ErrCode::Ok, Some(&response))
            }
            METHOD_REMOVE => {
                let body: KeyRequest = decode_body(request);
                let error = if store.remove(&body.key[..]).is_some() { 0 } else { 1 };
                let response = UpdateResponse {
                    error,
                    ..Default::default()
                };
                reply(request, ErrCode::Ok, Some(&response))
            }
            METHOD_EXIST => {
                let body: KeyRequest = decode_body(request);
                let error = if store.contains_key(&body.key[..]) { 0 } else { 1 };
                let response = ErrorResponse {
                    error,
                    ..Default::default()
                };
                reply(request, ErrCode::Ok, Some(&response))
            }
            other => panic!("unexpected method {other}"),
        }
    })
}

#[tokio::test]
async fn set_get_del_round_trip() {
    init_tracing();
    let server = MockServer::spawn(kv_handler).await;
    let client = Client::new(options(vec![server.endpoint()])).unwrap();

    client
        .set("temp", b"user", b"profile", b"v1", None, None)
        .await
        .unwrap();

    let value = client.get("temp", b"user", b"profile", None).await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"v1"[..]));
    assert!(client.exist("temp", b"user", b"profile", None).await.unwrap());

    assert_eq!(client.get("temp", b"user", b"missing", None).await.unwrap(), None);

    client.del("temp", b"user", b"profile", None).await.unwrap();
    assert_eq!(client.get("temp", b"user", b"profile", None).await.unwrap(), None);
    assert!(!client.exist("temp", b"user", b"profile", None).await.unwrap());

    // Deleting an absent record is quietly fine.
    client.del("temp", b"user", b"profile", None).await.unwrap();

    // The partition map was fetched once and reused throughout.
    assert_eq!(server.calls(METHOD_QUERY_CFG), 1);
}

#[tokio::test]
async fn multi_key_operations_share_one_hash_key() {
    type HashStore = HashMap<Vec<u8>, Vec<(Vec<u8>, Vec<u8>)>>;

    let server = MockServer::spawn(|addr| {
        let primary = rpc_address_of(addr);
        let store: Arc<Mutex<HashStore>> = Arc::default();
        Arc::new(move |request| {
            let mut store = store.lock().unwrap();
            match request.method.as_str() {
                METHOD_QUERY_CFG => config_reply(request, 2, 8, 5, primary),
                METHOD_MULTI_PUT => {
                    let body: MultiPutRequest = decode_body(request);
                    let records = store.entry(body.hash_key.to_vec()).or_default();
                    for kv in body.kvs {
                        records.retain(|(sort, _)| sort[..] != kv.key[..]);
                        records.push((kv.key.to_vec(), kv.value.to_vec()));
                    }
                    records.sort();
                    reply(request, ErrCode::Ok, Some(&UpdateResponse::default()))
                }
                METHOD_MULTI_GET => {
                    let body: MultiGetRequest = decode_body(request);
                    let response = match store.get(&body.hash_key[..]) {
                        None => MultiGetResponse {
                            error: 1,
                            ..Default::default()
                        },
                        Some(records) => MultiGetResponse {
                            error: 0,
                            kvs: records
                                .iter()
                                .filter(|(sort, _)| {
                                    body.sort_keys.is_empty()
                                        || body.sort_keys.iter().any(|want| want[..] == sort[..])
                                })
                                .map(|(sort, value)| KeyValue {
                                    key: Bytes::copy_from_slice(sort),
                                    value: if body.no_value {
                                        Bytes::new()
                                    } else {
                                        Bytes::copy_from_slice(value)
                                    },
                                })
                                .collect(),
                            ..Default::default()
                        },
                    };
                    reply(request, ErrCode::Ok, Some(&response))
                }
                METHOD_MULTI_REMOVE => {
                    let body: MultiRemoveRequest = decode_body(request);
                    let mut removed = 0i64;
                    if let Some(records) = store.get_mut(&body.hash_key[..]) {
                        records.retain(|(sort, _)| {
                            let hit = body.sort_keys.iter().any(|want| want[..] == sort[..]);
                            removed += hit as i64;
                            !hit
                        });
                    }
                    let response = MultiRemoveResponse {
                        error: 0,
                        count: removed,
                        ..Default::default()
                    };
                    reply(request, ErrCode::Ok, Some(&response))
                }
                METHOD_SORTKEY_COUNT => {
                    let body: CountRequest = decode_body(request);
                    let response = CountResponse {
                        error: 0,
                        count: store.get(&body.hash_key[..]).map_or(0, |r| r.len() as i64),
                        ..Default::default()
                    };
                    reply(request, ErrCode::Ok, Some(&response))
                }
                other => panic!("unexpected method {other}"),
            }
        })
    })
    .await;

    let client = Client::new(options(vec![server.endpoint()])).unwrap();
    let kvs = vec![
        (Bytes::from_static(b"s1"), Bytes::from_static(b"v1")),
        (Bytes::from_static(b"s2"), Bytes::from_static(b"v2")),
        (Bytes::from_static(b"s3"), Bytes::from_static(b"v3")),
    ];
    client
        .multi_set("temp", b"account", &kvs, None, None)
        .await
        .unwrap();

    assert_eq!(client.sortkey_count("temp", b"account", None).await.unwrap(), 3);

    let all = client.multi_get("temp", b"account", &[], None).await.unwrap();
    assert_eq!(all, kvs);

    let some = client
        .multi_get("temp", b"account", &[Bytes::from_static(b"s2")], None)
        .await
        .unwrap();
    assert_eq!(some, kvs[1..2]);

    let sort_keys = client
        .multi_get_sort_keys("temp", b"account", None)
        .await
        .unwrap();
    assert_eq!(
        sort_keys,
        vec![
            Bytes::from_static(b"s1"),
            Bytes::from_static(b"s2"),
            Bytes::from_static(b"s3"),
        ]
    );

    let removed = client
        .multi_del(
            "temp",
            b"account",
            &[Bytes::from_static(b"s1"), Bytes::from_static(b"s3")],
            None,
        )
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(client.sortkey_count("temp", b"account", None).await.unwrap(), 1);

    // A hash key nobody wrote reads back empty rather than failing.
    assert!(client.multi_get("temp", b"nobody", &[], None).await.unwrap().is_empty());
}

#[tokio::test]
async fn routing_stale_triggers_one_refresh_and_one_resend() {
    let gets = Arc::new(AtomicUsize::new(0));
    let ballot = Arc::new(AtomicI64::new(3));

    let server = MockServer::spawn({
        let gets = gets.clone();
        move |addr| {
            let primary = rpc_address_of(addr);
            Arc::new(move |request| match request.method.as_str() {
                METHOD_QUERY_CFG => {
                    // Each refresh observes a newer ballot, as a real
                    // failover would produce.
                    let ballot = ballot.fetch_add(1, Ordering::SeqCst);
                    config_reply(request, 1, 4, ballot, primary)
                }
                METHOD_GET => {
                    if gets.fetch_add(1, Ordering::SeqCst) == 0 {
                        reply::<ReadResponse>(request, ErrCode::InvalidState, None)
                    } else {
                        let response = ReadResponse {
                            error: 0,
                            value: Bytes::from_static(b"fresh"),
                            ..Default::default()
                        };
                        reply(request, ErrCode::Ok, Some(&response))
                    }
                }
                other => panic!("unexpected method {other}"),
            })
        }
    })
    .await;

    let client = Client::new(options(vec![server.endpoint()])).unwrap();
    let started = std::time::Instant::now();
    let value = client.get("temp", b"h", b"s", None).await.unwrap();

    assert_eq!(value.as_deref(), Some(&b"fresh"[..]));
    assert!(started.elapsed() < Duration::from_secs(5));
    // One query to open the table, exactly one more for the refresh.
    assert_eq!(server.calls(METHOD_QUERY_CFG), 2);
    assert_eq!(server.calls(METHOD_GET), 2);
}

#[tokio::test]
async fn tolerant_batch_keeps_positional_outcomes() {
    let server = MockServer::spawn(kv_handler).await;
    let client = Client::new(options(vec![server.endpoint()])).unwrap();

    client.set("temp", b"k1", b"s", b"v1", None, None).await.unwrap();
    client.set("temp", b"k3", b"s", b"v3", None, None).await.unwrap();

    // The middle key is client-side invalid: its hash key is oversized.
    let oversized = Bytes::from(vec![0u8; 0x1_0000]);
    let keys = vec![
        (Bytes::from_static(b"k1"), Bytes::from_static(b"s")),
        (oversized.clone(), Bytes::from_static(b"s")),
        (Bytes::from_static(b"k3"), Bytes::from_static(b"s")),
    ];

    let (results, failures) = client.batch_get2("temp", &keys, None).await;
    assert_eq!(failures, 1);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().as_deref(), Some(&b"v1"[..]));
    assert!(matches!(results[1], Err(Error::InvalidArgument(_))));
    assert_eq!(results[2].as_ref().unwrap().as_deref(), Some(&b"v3"[..]));

    // The fail-fast flavor surfaces that same error instead.
    let err = client.batch_get("temp", &keys, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    // And an all-good batch comes back parallel to its inputs.
    let keys = vec![
        (Bytes::from_static(b"k1"), Bytes::from_static(b"s")),
        (Bytes::from_static(b"k2"), Bytes::from_static(b"s")),
        (Bytes::from_static(b"k3"), Bytes::from_static(b"s")),
    ];
    let values = client.batch_get("temp", &keys, None).await.unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0].as_deref(), Some(&b"v1"[..]));
    assert_eq!(values[1], None);
    assert_eq!(values[2].as_deref(), Some(&b"v3"[..]));
}

#[tokio::test]
async fn concurrent_batch_multiplexes_one_session() {
    let server = MockServer::spawn(kv_handler).await;
    let client = Client::new(options(vec![server.endpoint()])).unwrap();

    let items: Vec<_> = (0..32)
        .map(|i| pegasus::SetItem {
            hash_key: Bytes::from(format!("h{i}")),
            sort_key: Bytes::from_static(b"s"),
            value: Bytes::from(format!("v{i}")),
            ttl: None,
        })
        .collect();
    client.batch_set("temp", &items, None).await.unwrap();

    let keys: Vec<_> = (0..32)
        .map(|i| (Bytes::from(format!("h{i}")), Bytes::from_static(b"s")))
        .collect();
    let values = client.batch_get("temp", &keys, None).await.unwrap();
    for (i, value) in values.iter().enumerate() {
        assert_eq!(value.as_deref(), Some(format!("v{i}").as_bytes()));
    }
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let server = MockServer::spawn(|addr| {
        let primary = rpc_address_of(addr);
        Arc::new(move |request| match request.method.as_str() {
            METHOD_QUERY_CFG => config_reply(request, 1, 4, 3, primary),
            // Swallow everything else.
            _ => None,
        })
    })
    .await;

    let client = Client::new(options(vec![server.endpoint()])).unwrap();
    let started = std::time::Instant::now();
    let err = client
        .get("temp", b"h", b"s", Some(Duration::from_millis(300)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn meta_failover_rotates_to_a_live_endpoint() {
    let dead = dead_endpoint().await;
    let server = MockServer::spawn(kv_handler).await;

    let client = Client::new(options(vec![dead, server.endpoint()])).unwrap();
    client.set("temp", b"h", b"s", b"v", None, None).await.unwrap();
    let value = client.get("temp", b"h", b"s", None).await.unwrap();

    assert_eq!(value.as_deref(), Some(&b"v"[..]));
    assert_eq!(server.calls(METHOD_QUERY_CFG), 1);
}

#[tokio::test]
async fn closed_client_refuses_calls() {
    let server = MockServer::spawn(kv_handler).await;
    let client = Client::new(options(vec![server.endpoint()])).unwrap();

    client.set("temp", b"h", b"s", b"v", None, None).await.unwrap();
    client.close();

    assert!(matches!(
        client.get("temp", b"h", b"s", None).await,
        Err(Error::Closed)
    ));
    let (results, failures) = client
        .batch_get2("temp", &[(Bytes::from_static(b"h"), Bytes::from_static(b"s"))], None)
        .await;
    assert_eq!(failures, 1);
    assert!(matches!(results[0], Err(Error::Closed)));

    // Closing twice is fine.
    client.close();
}
