use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::json;

use capstan_types::StatusSource;

/// Connection counters maintained by the link actor.
///
/// The reconnect machine is invisible to application logic beyond these
/// numbers; they exist for the status surface and for log correlation.
pub struct LinkStats {
    address: String,
    connected: AtomicBool,
    reconnects: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl LinkStats {
    pub fn new(address: String) -> Self {
        Self {
            address,
            connected: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().expect("lock poisoned") = Some(error.to_string());
    }
}

impl StatusSource for LinkStats {
    fn name(&self) -> &str {
        "link"
    }

    fn status(&self) -> serde_json::Value {
        json!({
            "address": self.address,
            "connected": self.connected.load(Ordering::Relaxed),
            "reconnects": self.reconnects.load(Ordering::Relaxed),
            "timeouts": self.timeouts.load(Ordering::Relaxed),
            "errors": self.errors.load(Ordering::Relaxed),
            "last_error": *self.last_error.lock().expect("lock poisoned"),
        })
    }
}
