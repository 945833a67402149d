//! Interns one live session per endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::session::Session;
use crate::{Error, Result};

#[derive(Clone)]
pub(crate) struct SessionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    sessions: Mutex<HashMap<String, Session>>,
    connect_timeout: Duration,
    closed: AtomicBool,
}

impl SessionPool {
    pub(crate) fn new(connect_timeout: Duration) -> SessionPool {
        SessionPool {
            inner: Arc::new(PoolInner {
                sessions: Mutex::new(HashMap::new()),
                connect_timeout,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the live session for `addr`, dialing a fresh one if none
    /// exists or the previous one failed.
    pub(crate) fn get(&self, addr: &str) -> Result<Session> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let mut sessions = self.inner.sessions.lock().unwrap();
        if let Some(session) = sessions.get(addr) {
            if !session.is_failed() {
                return Ok(session.clone());
            }
            tracing::debug!(addr, "replacing failed session");
        }
        let session = Session::connect(addr.to_string(), self.inner.connect_timeout);
        sessions.insert(addr.to_string(), session.clone());
        Ok(session)
    }

    /// Closes every session; subsequent `get`s are refused.
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let sessions: Vec<_> = {
            let mut map = self.inner.sessions.lock().unwrap();
            map.drain().collect()
        };
        for (_addr, session) in sessions {
            session.close();
        }
    }
}
