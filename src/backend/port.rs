//! Local port allocation for backend listeners
//!
//! A port is found by binding an ephemeral listener and releasing it again.
//! Ports handed out stay reserved here until the owning session releases
//! them, so two live sessions never receive the same number even when the OS
//! recycles it between probes.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;

use tokio::net::TcpListener;

use crate::common::{Error, Result};

/// Attempts before giving up with `ResourceExhaustion`
const MAX_ATTEMPTS: usize = 16;

/// Hands out free local ports and tracks which ones are in use by sessions
#[derive(Debug)]
pub struct PortAllocator {
    host: IpAddr,
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve a port that was free at the moment of probing
    ///
    /// The probe listener is closed before returning, so the backend can bind
    /// the port itself. Someone else could take it in between; the readiness
    /// check after spawn catches that.
    pub async fn acquire(&self) -> Result<u16> {
        let mut last_error = None;

        for _ in 0..MAX_ATTEMPTS {
            let port = match probe(self.host).await {
                Ok(port) => port,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };

            let mut reserved = self
                .reserved
                .lock()
                .map_err(|_| Error::Internal("port table poisoned".to_string()))?;
            if reserved.insert(port) {
                tracing::trace!(port, "Reserved backend port");
                return Ok(port);
            }
            tracing::trace!(port, "OS returned a port still held by a session, retrying");
        }

        Err(Error::ResourceExhaustion(match last_error {
            Some(e) => format!("could not bind {}: {}", self.host, e),
            None => format!("{} attempts returned ports already in use", MAX_ATTEMPTS),
        }))
    }

    /// Reserve a port that goes back to the pool unless kept
    pub async fn lease(&self) -> Result<PortLease<'_>> {
        let port = self.acquire().await?;
        Ok(PortLease {
            allocator: self,
            port,
            kept: false,
        })
    }

    /// Return a port to the pool once its session is gone
    pub fn release(&self, port: u16) {
        if let Ok(mut reserved) = self.reserved.lock() {
            reserved.remove(&port);
        }
    }

    /// Number of ports currently held by sessions
    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// A reservation that is released on drop
///
/// Session creation holds one of these until the session is registered, so
/// a failed or abandoned start never leaks its port.
pub struct PortLease<'a> {
    allocator: &'a PortAllocator,
    port: u16,
    kept: bool,
}

impl PortLease<'_> {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Hand the reservation over to a session
    pub fn keep(mut self) -> u16 {
        self.kept = true;
        self.port
    }
}

impl Drop for PortLease<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.allocator.release(self.port);
        }
    }
}

async fn probe(host: IpAddr) -> std::io::Result<u16> {
    let listener = TcpListener::bind(SocketAddr::new(host, 0)).await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn test_acquire_returns_bindable_port() {
        let ports = PortAllocator::new(localhost());
        let port = ports.acquire().await.unwrap();
        assert!(port >= 1024);

        // The probe listener must be gone again
        let listener = TcpListener::bind(SocketAddr::new(localhost(), port)).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_is_unique() {
        let ports = Arc::new(PortAllocator::new(localhost()));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let ports = ports.clone();
            handles.push(tokio::spawn(async move { ports.acquire().await }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let port = handle.await.unwrap().unwrap();
            assert!(seen.insert(port), "port {} handed out twice", port);
        }
        assert_eq!(ports.reserved_count(), 32);
    }

    #[tokio::test]
    async fn test_release() {
        let ports = PortAllocator::new(localhost());
        let port = ports.acquire().await.unwrap();
        assert_eq!(ports.reserved_count(), 1);
        ports.release(port);
        ports.release(port);
        assert_eq!(ports.reserved_count(), 0);
    }

    #[tokio::test]
    async fn test_lease_released_unless_kept() {
        let ports = PortAllocator::new(localhost());
        {
            let lease = ports.lease().await.unwrap();
            assert!(lease.port() > 0);
            assert_eq!(ports.reserved_count(), 1);
        }
        assert_eq!(ports.reserved_count(), 0);

        let port = ports.lease().await.unwrap().keep();
        assert_eq!(ports.reserved_count(), 1);
        ports.release(port);
    }
}
