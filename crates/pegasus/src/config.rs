//! Client configuration.
//!
//! The configuration loader (file, zookeeper, resource bundles) lives
//! outside this crate and hands over a flat string property map; this
//! module gives it types and defaults. Keys that the core does not
//! recognize are left for the loader's other consumers.

use std::collections::HashMap;
use std::time::Duration;

use crate::{Error, Result};

pub const KEY_META_SERVERS: &str = "meta_servers";
pub const KEY_OPERATION_TIMEOUT_MS: &str = "operation_timeout_ms";
pub const KEY_CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";
pub const KEY_ASYNC_WORKERS: &str = "async_workers";
pub const KEY_MAX_TRANSPORT_RETRIES: &str = "max_transport_retries";
pub const KEY_ENABLE_PERF_COUNTER: &str = "enable_perf_counter";
pub const KEY_PERF_COUNTER_TAGS: &str = "perf_counter_tags";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Meta server endpoints, `host:port`.
    pub meta_servers: Vec<String>,
    /// Default per-operation deadline.
    pub operation_timeout: Duration,
    /// Deadline for establishing one TCP connection.
    pub connect_timeout: Duration,
    /// Worker threads for the blocking facade's runtime.
    pub async_workers: usize,
    /// Attempts per operation against transport-level failures.
    pub max_transport_retries: u32,
    pub enable_perf_counter: bool,
    /// Opaque tag string handed to the metrics sink untouched.
    pub perf_counter_tags: String,
}

impl ClientOptions {
    pub fn new<I, S>(meta_servers: I) -> ClientOptions
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientOptions {
            meta_servers: meta_servers.into_iter().map(Into::into).collect(),
            operation_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(5000),
            async_workers: default_workers(),
            max_transport_retries: 3,
            enable_perf_counter: false,
            perf_counter_tags: String::new(),
        }
    }

    /// Builds options from the loader's property map. Missing keys keep
    /// their defaults; malformed values are rejected rather than guessed.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<ClientOptions> {
        let meta = properties
            .get(KEY_META_SERVERS)
            .ok_or_else(|| missing(KEY_META_SERVERS))?;
        let mut options = ClientOptions::new(
            meta.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        if options.meta_servers.is_empty() {
            return Err(missing(KEY_META_SERVERS));
        }

        if let Some(value) = properties.get(KEY_OPERATION_TIMEOUT_MS) {
            options.operation_timeout =
                Duration::from_millis(parse_positive(KEY_OPERATION_TIMEOUT_MS, value)?);
        }
        if let Some(value) = properties.get(KEY_CONNECT_TIMEOUT_MS) {
            options.connect_timeout =
                Duration::from_millis(parse_positive(KEY_CONNECT_TIMEOUT_MS, value)?);
        }
        if let Some(value) = properties.get(KEY_ASYNC_WORKERS) {
            options.async_workers = parse_positive(KEY_ASYNC_WORKERS, value)? as usize;
        }
        if let Some(value) = properties.get(KEY_MAX_TRANSPORT_RETRIES) {
            options.max_transport_retries = value.parse().map_err(|_| {
                Error::InvalidArgument(format!(
                    "property `{KEY_MAX_TRANSPORT_RETRIES}` must be an integer, got {value:?}"
                ))
            })?;
        }
        if let Some(value) = properties.get(KEY_ENABLE_PERF_COUNTER) {
            options.enable_perf_counter = value.parse().map_err(|_| {
                Error::InvalidArgument(format!(
                    "property `{KEY_ENABLE_PERF_COUNTER}` must be true or false, got {value:?}"
                ))
            })?;
        }
        if let Some(value) = properties.get(KEY_PERF_COUNTER_TAGS) {
            options.perf_counter_tags = value.clone();
        }
        Ok(options)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

fn missing(key: &str) -> Error {
    Error::InvalidArgument(format!("missing required property `{key}`"))
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "property `{key}` must be a positive integer, got {value:?}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let options =
            ClientOptions::from_properties(&props(&[("meta_servers", "meta1:34601,meta2:34601")]))
                .unwrap();
        assert_eq!(options.meta_servers, vec!["meta1:34601", "meta2:34601"]);
        assert_eq!(options.operation_timeout, Duration::from_millis(1000));
        assert_eq!(options.connect_timeout, Duration::from_millis(5000));
        assert!(!options.enable_perf_counter);
        assert!(options.async_workers >= 1);
    }

    #[test]
    fn overrides_are_honored() {
        let options = ClientOptions::from_properties(&props(&[
            ("meta_servers", " meta1:34601 , meta2:34601 "),
            ("operation_timeout_ms", "250"),
            ("async_workers", "8"),
            ("enable_perf_counter", "true"),
            ("perf_counter_tags", "cluster=c1,region=r1"),
        ]))
        .unwrap();
        assert_eq!(options.meta_servers, vec!["meta1:34601", "meta2:34601"]);
        assert_eq!(options.operation_timeout, Duration::from_millis(250));
        assert_eq!(options.async_workers, 8);
        assert!(options.enable_perf_counter);
        assert_eq!(options.perf_counter_tags, "cluster=c1,region=r1");
    }

    #[test]
    fn missing_or_malformed_values_are_rejected() {
        assert!(matches!(
            ClientOptions::from_properties(&props(&[])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ClientOptions::from_properties(&props(&[("meta_servers", " , ")])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ClientOptions::from_properties(&props(&[
                ("meta_servers", "m:1"),
                ("operation_timeout_ms", "0"),
            ])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ClientOptions::from_properties(&props(&[
                ("meta_servers", "m:1"),
                ("enable_perf_counter", "yes"),
            ])),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let options = ClientOptions::from_properties(&props(&[
            ("meta_servers", "m:1"),
            ("zk_session_timeout_ms", "30000"),
        ]))
        .unwrap();
        assert_eq!(options.meta_servers, vec!["m:1"]);
    }
}
