use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Gate for the full status dump, record lookup, and uploads. Requests
    /// without it only see the liveness greeting.
    pub secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:14000".parse().unwrap(),
            secret: "secret".into(),
        }
    }
}
