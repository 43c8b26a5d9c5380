//! Per-upstream cache of idle connections.
//!
//! Connections are kept per protocol, ordered by when they were last handed
//! back. A connection is reused only while it has been idle for less than the
//! configured expiry; a background reaper closes the ones that outlive it.

use super::connection::DnsConnection;
use super::tls::TlsSettings;
use super::Protocol;
use dashmap::DashMap;
use ferrous_forward_domain::DomainError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Idle connections kept per protocol; extra ones are closed on yield.
pub const MAX_IDLE_PER_PROTOCOL: usize = 2;

struct IdleConn {
    conn: DnsConnection,
    used: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub expired: u64,
    pub idle: usize,
}

pub struct ConnectionPool {
    server: SocketAddr,
    tls: Option<TlsSettings>,
    expire: Duration,
    dial_timeout: Duration,
    idle: DashMap<Protocol, Vec<IdleConn>>,
    total_created: AtomicU64,
    total_reused: AtomicU64,
    total_expired: AtomicU64,
    shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    pub fn new(
        server: SocketAddr,
        tls: Option<TlsSettings>,
        expire: Duration,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            server,
            tls,
            expire,
            dial_timeout,
            idle: DashMap::new(),
            total_created: AtomicU64::new(0),
            total_reused: AtomicU64::new(0),
            total_expired: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            reaper: Mutex::new(None),
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn expire(&self) -> Duration {
        self.expire
    }

    /// Hand out a connection for `protocol`, reusing an idle one when possible.
    ///
    /// The flag is `true` when the connection came from the cache.
    pub async fn dial(&self, protocol: Protocol) -> Result<(DnsConnection, bool), DomainError> {
        if let Some(conn) = self.take_idle(protocol) {
            self.total_reused.fetch_add(1, Ordering::Relaxed);
            return Ok((conn, true));
        }

        let conn = self.connect(protocol).await?;
        Ok((conn, false))
    }

    /// Always open a new connection, bypassing the cache.
    pub async fn connect(&self, protocol: Protocol) -> Result<DnsConnection, DomainError> {
        let conn =
            DnsConnection::connect(self.server, protocol, self.tls.as_ref(), self.dial_timeout)
                .await?;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    /// Return a healthy connection after a completed exchange.
    pub fn yield_conn(&self, conn: DnsConnection) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let mut entry = self.idle.entry(conn.protocol()).or_default();
        if entry.len() >= MAX_IDLE_PER_PROTOCOL {
            return;
        }
        entry.push(IdleConn {
            conn,
            used: Instant::now(),
        });
    }

    fn take_idle(&self, protocol: Protocol) -> Option<DnsConnection> {
        let now = Instant::now();
        let (fresh, stale) = {
            let mut entry = self.idle.get_mut(&protocol)?;
            let split = entry.partition_point(|c| now.duration_since(c.used) >= self.expire);
            let stale: Vec<IdleConn> = entry.drain(..split).collect();
            (entry.pop(), stale)
        };

        if !stale.is_empty() {
            self.total_expired
                .fetch_add(stale.len() as u64, Ordering::Relaxed);
        }
        fresh.map(|idle| idle.conn)
    }

    /// Close every idle connection older than the expiry. Returns how many were closed.
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let mut stale = Vec::new();
        for mut entry in self.idle.iter_mut() {
            let split = entry.partition_point(|c| now.duration_since(c.used) >= self.expire);
            stale.extend(entry.drain(..split));
        }

        let closed = stale.len();
        if closed > 0 {
            self.total_expired
                .fetch_add(closed as u64, Ordering::Relaxed);
        }
        closed
    }

    /// Spawn the reaper. It ticks once per expiry period until [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>) {
        let pool = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.expire;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        let closed = pool.reap();
                        if closed > 0 {
                            debug!(server = %pool.server, closed, "Closed expired upstream connections");
                        }
                    }
                }
            }
        });

        if let Ok(mut reaper) = self.reaper.lock() {
            if let Some(previous) = reaper.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the reaper and close all idle connections.
    ///
    /// Connections currently lent out are closed when they are yielded back.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handle = self.reaper.lock().ok().and_then(|mut reaper| reaper.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.idle.clear();
    }

    pub fn idle_count(&self, protocol: Protocol) -> usize {
        self.idle.get(&protocol).map(|e| e.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.total_created.load(Ordering::Relaxed),
            reused: self.total_reused.load(Ordering::Relaxed),
            expired: self.total_expired.load(Ordering::Relaxed),
            idle: self.idle.iter().map(|e| e.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    async fn pool_with_expire(expire: Duration) -> (Arc<ConnectionPool>, UdpSocket) {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let pool = Arc::new(ConnectionPool::new(
            addr,
            None,
            expire,
            Duration::from_secs(1),
        ));
        (pool, upstream)
    }

    #[tokio::test]
    async fn test_dial_reuses_yielded_connection() {
        let (pool, _upstream) = pool_with_expire(Duration::from_secs(10)).await;

        let (conn, cached) = pool.dial(Protocol::Udp).await.unwrap();
        assert!(!cached);
        pool.yield_conn(conn);
        assert_eq!(pool.idle_count(Protocol::Udp), 1);

        let (_conn, cached) = pool.dial(Protocol::Udp).await.unwrap();
        assert!(cached);
        assert_eq!(pool.idle_count(Protocol::Udp), 0);

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
    }

    #[tokio::test]
    async fn test_protocols_are_pooled_separately() {
        let (pool, _upstream) = pool_with_expire(Duration::from_secs(10)).await;

        let (conn, _) = pool.dial(Protocol::Udp).await.unwrap();
        pool.yield_conn(conn);

        assert_eq!(pool.idle_count(Protocol::Tcp), 0);
        assert_eq!(pool.idle_count(Protocol::Udp), 1);
    }

    #[tokio::test]
    async fn test_expired_connection_is_not_reused() {
        let (pool, _upstream) = pool_with_expire(Duration::from_millis(50)).await;

        let (conn, _) = pool.dial(Protocol::Udp).await.unwrap();
        pool.yield_conn(conn);
        tokio::time::sleep(Duration::from_millis(120)).await;

        let (_conn, cached) = pool.dial(Protocol::Udp).await.unwrap();
        assert!(!cached);
        assert_eq!(pool.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_expired_tcp_connection_is_closed() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let pool = ConnectionPool::new(
            listener.local_addr().unwrap(),
            None,
            Duration::from_millis(50),
            Duration::from_secs(1),
        );

        let (conn, _) = pool.dial(Protocol::Tcp).await.unwrap();
        let (mut upstream_side, _) = listener.accept().await.unwrap();
        pool.yield_conn(conn);
        tokio::time::sleep(Duration::from_millis(120)).await;

        let (_conn, cached) = pool.dial(Protocol::Tcp).await.unwrap();
        assert!(!cached);
        assert_eq!(pool.stats().expired, 1);

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(1), upstream_side.read(&mut buf))
            .await
            .expect("evicted connection was left open")
            .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_idle_cap() {
        let (pool, _upstream) = pool_with_expire(Duration::from_secs(10)).await;

        let mut conns = Vec::new();
        for _ in 0..MAX_IDLE_PER_PROTOCOL + 2 {
            conns.push(pool.dial(Protocol::Udp).await.unwrap().0);
        }
        for conn in conns {
            pool.yield_conn(conn);
        }

        assert_eq!(pool.idle_count(Protocol::Udp), MAX_IDLE_PER_PROTOCOL);
    }

    #[tokio::test]
    async fn test_reaper_closes_expired() {
        let (pool, _upstream) = pool_with_expire(Duration::from_millis(40)).await;
        pool.start();

        let (conn, _) = pool.dial(Protocol::Udp).await.unwrap();
        pool.yield_conn(conn);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(pool.idle_count(Protocol::Udp), 0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_drops_idle_and_later_yields() {
        let (pool, _upstream) = pool_with_expire(Duration::from_secs(10)).await;
        pool.start();

        let (idle, _) = pool.dial(Protocol::Udp).await.unwrap();
        let (in_flight, _) = pool.dial(Protocol::Udp).await.unwrap();
        pool.yield_conn(idle);

        pool.stop().await;
        assert_eq!(pool.stats().idle, 0);

        pool.yield_conn(in_flight);
        assert_eq!(pool.stats().idle, 0);
    }
}
