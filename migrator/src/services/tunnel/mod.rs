//! Port forwarding to the source database and the destination API.
//!
//! A [`Transport`] knows how to reach one remote host. It can forward a local
//! port to an address seen from that host, read a file there, or perform a
//! handshake-only connection test.

pub mod ssh;

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use ssh::{SshTransport, SshTunnel};

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tunnel to {remote} exited before it was ready: {stderr}")]
    ExitedEarly { remote: String, stderr: String },

    #[error("Tunnel to {remote} not ready after {seconds}s")]
    NotReady { remote: String, seconds: u64 },

    #[error("SSH connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    #[error("Remote command failed on {host}: {message}")]
    Command { host: String, message: String },

    #[error("Tunnel '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("No local port available: {0}")]
    NoLocalPort(#[source] std::io::Error),
}

/// A live forward from a local port to a remote address
#[async_trait]
pub trait Tunnel: Send + Sync {
    fn local_addr(&self) -> SocketAddr;

    fn remote_addr(&self) -> String;

    async fn close(&mut self) -> Result<(), TunnelError>;
}

/// Access path to one remote host
#[async_trait]
pub trait Transport: Send + Sync {
    /// `user@host:port`, for logs
    fn describe(&self) -> String;

    /// Forward `127.0.0.1:local_port` to `remote_host:remote_port` as seen from
    /// the remote side. Returns once the local end accepts connections.
    async fn open(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, TunnelError>;

    /// Authenticate and disconnect without forwarding anything
    async fn test_connection(&self) -> Result<(), TunnelError>;

    /// File contents, or `None` if the file does not exist
    async fn read_remote_file(&self, path: &str) -> Result<Option<Vec<u8>>, TunnelError>;
}

/// Ask the OS for a free loopback port
pub async fn get_local_port() -> Result<u16, TunnelError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(TunnelError::NoLocalPort)?;
    let port = listener
        .local_addr()
        .map_err(TunnelError::NoLocalPort)?
        .port();
    Ok(port)
}

/// Named tunnels owned by one orchestrator
#[derive(Default)]
pub struct TunnelManager {
    tunnels: HashMap<String, Box<dyn Tunnel>>,
}

impl TunnelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a tunnel on a fresh local port and register it under `name`
    pub async fn create(
        &mut self,
        name: &str,
        transport: &dyn Transport,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<SocketAddr, TunnelError> {
        if self.tunnels.contains_key(name) {
            return Err(TunnelError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let local_port = get_local_port().await?;
        let tunnel = transport.open(local_port, remote_host, remote_port).await?;
        let local_addr = tunnel.local_addr();
        info!(
            "[Tunnel] {} via {}: {} -> {}",
            name,
            transport.describe(),
            local_addr,
            tunnel.remote_addr()
        );

        self.tunnels.insert(name.to_string(), tunnel);
        Ok(local_addr)
    }

    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.tunnels.get(name).map(|tunnel| tunnel.local_addr())
    }

    pub async fn close(&mut self, name: &str) -> Result<(), TunnelError> {
        match self.tunnels.remove(name) {
            Some(mut tunnel) => tunnel.close().await,
            None => Ok(()),
        }
    }

    pub async fn close_all(&mut self) {
        let closing = self.tunnels.drain().map(|(name, mut tunnel)| async move {
            if let Err(e) = tunnel.close().await {
                warn!("[Tunnel] Failed to close {}: {}", name, e);
            }
        });
        futures::future::join_all(closing).await;
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct LoopbackTunnel {
        local: SocketAddr,
        remote: String,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tunnel for LoopbackTunnel {
        fn local_addr(&self) -> SocketAddr {
            self.local
        }

        fn remote_addr(&self) -> String {
            self.remote.clone()
        }

        async fn close(&mut self) -> Result<(), TunnelError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct LoopbackTransport {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        fn describe(&self) -> String {
            "loopback".to_string()
        }

        async fn open(
            &self,
            local_port: u16,
            remote_host: &str,
            remote_port: u16,
        ) -> Result<Box<dyn Tunnel>, TunnelError> {
            Ok(Box::new(LoopbackTunnel {
                local: SocketAddr::from(([127, 0, 0, 1], local_port)),
                remote: format!("{}:{}", remote_host, remote_port),
                closed: self.closed.clone(),
            }))
        }

        async fn test_connection(&self) -> Result<(), TunnelError> {
            Ok(())
        }

        async fn read_remote_file(&self, _path: &str) -> Result<Option<Vec<u8>>, TunnelError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_manager_registers_and_closes_tunnels() {
        let closed = Arc::new(AtomicUsize::new(0));
        let transport = LoopbackTransport {
            closed: closed.clone(),
        };
        let mut manager = TunnelManager::new();

        let db = manager
            .create("mattermost", &transport, "localhost", 5432)
            .await
            .unwrap();
        assert_ne!(db.port(), 0);
        assert_eq!(manager.local_addr("mattermost"), Some(db));

        let duplicate = manager
            .create("mattermost", &transport, "localhost", 5432)
            .await;
        assert!(matches!(duplicate, Err(TunnelError::AlreadyExists { .. })));

        manager
            .create("matrix", &transport, "127.0.0.1", 8008)
            .await
            .unwrap();
        assert_eq!(manager.len(), 2);

        manager.close("mattermost").await.unwrap();
        manager.close_all().await;
        assert!(manager.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
