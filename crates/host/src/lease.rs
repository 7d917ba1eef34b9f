//! Exclusive port ownership
//!
//! A [`PortLease`] couples an in-process lock keyed by port number with the
//! bound socket itself. Whoever holds the lease owns the port until the lease
//! is dropped, so two suites in the same process queue up instead of racing
//! for `bind()`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{HostError, HostResult};

static LEASES: Lazy<Mutex<HashMap<u16, Arc<AsyncMutex<()>>>>> = Lazy::new(Default::default);

fn port_lock(port: u16) -> Arc<AsyncMutex<()>> {
    LEASES.lock().entry(port).or_default().clone()
}

/// Exclusive ownership of a TCP port and its bound listener
pub struct PortLease {
    addr: SocketAddr,
    // Declared before the guard so the socket closes before the lock opens.
    listener: Option<TcpListener>,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl PortLease {
    /// Wait for the in-process lock on `port`, then bind it.
    ///
    /// Port 0 asks the OS for an ephemeral port and never waits; the lock
    /// for the port it hands out is taken once bound.
    pub async fn acquire(ip: IpAddr, port: u16) -> HostResult<Self> {
        let guard = if port == 0 {
            None
        } else {
            debug!(port, "Waiting for port lease");
            Some(port_lock(port).lock_owned().await)
        };
        Self::bind(ip, port, guard)
    }

    /// Like [`PortLease::acquire`] but fails with [`HostError::PortBusy`]
    /// instead of waiting.
    pub fn try_acquire(ip: IpAddr, port: u16) -> HostResult<Self> {
        let guard = if port == 0 {
            None
        } else {
            let guard = port_lock(port)
                .try_lock_owned()
                .map_err(|_| HostError::PortBusy(port))?;
            Some(guard)
        };
        Self::bind(ip, port, guard)
    }

    fn bind(ip: IpAddr, port: u16, guard: Option<OwnedMutexGuard<()>>) -> HostResult<Self> {
        let requested = SocketAddr::new(ip, port);
        let listener =
            TcpListener::bind(requested).map_err(|source| HostError::Bind { addr: requested, source })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let guard = guard.or_else(|| port_lock(addr.port()).try_lock_owned().ok());

        info!("Port {} leased", addr.port());
        Ok(Self {
            addr,
            listener: Some(listener),
            _guard: guard,
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Hand the bound listener to a server. The lease keeps the lock.
    pub(crate) fn take_listener(&mut self) -> HostResult<TcpListener> {
        self.listener.take().ok_or(HostError::LeaseConsumed(self.addr))
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        debug!("Port {} lease released", self.addr.port());
    }
}
