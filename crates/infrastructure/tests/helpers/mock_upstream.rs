#![allow(dead_code)]
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::oneshot;

/// How the mock answers each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// NOERROR with one A record.
    Answer,
    /// Header-only reply with this RCODE.
    Rcode(u8),
    /// Reply with the TC bit set and no answer.
    Truncated,
    /// First a reply with a wrong ID, then the real answer.
    WrongIdFirst,
    /// Read the query and never reply.
    Silent,
    /// TC bit on UDP, full answer on TCP.
    TruncatedOverUdp,
    /// Answer once on TCP, then close the connection.
    CloseAfterAnswer,
}

#[derive(Default)]
struct Counters {
    udp_queries: AtomicUsize,
    tcp_queries: AtomicUsize,
    tcp_connections: AtomicUsize,
}

/// Loopback upstream listening on UDP and TCP on the same port.
pub struct MockUpstream {
    addr: SocketAddr,
    behavior: Arc<Mutex<Behavior>>,
    counters: Arc<Counters>,
    last_query: Arc<Mutex<Option<Vec<u8>>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    pub async fn start(behavior: Behavior) -> Self {
        let (udp, tcp) = bind_pair().await;
        let addr = udp.local_addr().unwrap();

        let behavior = Arc::new(Mutex::new(behavior));
        let counters = Arc::new(Counters::default());
        let last_query = Arc::new(Mutex::new(None));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let (b, c, l) = (behavior.clone(), counters.clone(), last_query.clone());
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = udp.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { continue };
                        c.udp_queries.fetch_add(1, Ordering::SeqCst);
                        let query = buf[..len].to_vec();
                        *l.lock().unwrap() = Some(query.clone());
                        let current = *b.lock().unwrap();
                        for reply in replies(&query, current, false) {
                            let _ = udp.send_to(&reply, peer).await;
                        }
                    }
                    accepted = tcp.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        c.tcp_connections.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve_tcp(stream, b.clone(), c.clone(), l.clone()));
                    }
                }
            }
        });

        Self {
            addr,
            behavior,
            counters,
            last_query,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn udp_queries(&self) -> usize {
        self.counters.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_queries(&self) -> usize {
        self.counters.tcp_queries.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.udp_queries() + self.tcp_queries()
    }

    pub fn tcp_connections(&self) -> usize {
        self.counters.tcp_connections.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Vec<u8>> {
        self.last_query.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn bind_pair() -> (UdpSocket, TcpListener) {
    for _ in 0..20 {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        if let Ok(tcp) = TcpListener::bind(addr).await {
            return (udp, tcp);
        }
    }
    panic!("could not bind UDP and TCP on the same loopback port");
}

async fn serve_tcp(
    mut stream: TcpStream,
    behavior: Arc<Mutex<Behavior>>,
    counters: Arc<Counters>,
    last_query: Arc<Mutex<Option<Vec<u8>>>>,
) {
    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return;
        }
        let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        if stream.read_exact(&mut query).await.is_err() {
            return;
        }
        counters.tcp_queries.fetch_add(1, Ordering::SeqCst);
        *last_query.lock().unwrap() = Some(query.clone());

        let current = *behavior.lock().unwrap();
        for reply in replies(&query, current, true) {
            let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
            framed.extend_from_slice(&reply);
            if stream.write_all(&framed).await.is_err() {
                return;
            }
        }
        if current == Behavior::CloseAfterAnswer {
            return;
        }
    }
}

fn replies(query: &[u8], behavior: Behavior, over_tcp: bool) -> Vec<Vec<u8>> {
    if query.len() < 12 {
        return Vec::new();
    }
    match behavior {
        Behavior::Answer | Behavior::CloseAfterAnswer => vec![answer(query)],
        Behavior::TruncatedOverUdp if over_tcp => vec![answer(query)],
        Behavior::TruncatedOverUdp => vec![header_only(query, 0x83, 0x80)],
        Behavior::Rcode(rcode) => vec![header_only(query, 0x81, 0x80 | (rcode & 0x0F))],
        Behavior::Truncated => vec![header_only(query, 0x83, 0x80)],
        Behavior::WrongIdFirst => {
            let mut wrong = answer(query);
            wrong[0] ^= 0xFF;
            wrong[1] ^= 0xFF;
            vec![wrong, answer(query)]
        }
        Behavior::Silent => Vec::new(),
    }
}

/// Echo the header and question, flip QR, and append `93.184.216.34`.
fn answer(query: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(query.len() + 16);
    response.extend_from_slice(&query[0..2]);
    response.push(0x81);
    response.push(0x80);
    response.extend_from_slice(&query[4..6]);
    response.extend_from_slice(&[0x00, 0x01]);
    response.extend_from_slice(&[0x00, 0x00]);
    response.extend_from_slice(&[0x00, 0x00]);
    response.extend_from_slice(&query[12..]);
    response.extend_from_slice(&[
        0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3c, 0x00, 0x04, 93, 184, 216, 34,
    ]);
    response
}

fn header_only(query: &[u8], flags_hi: u8, flags_lo: u8) -> Vec<u8> {
    let mut response = Vec::with_capacity(query.len());
    response.extend_from_slice(&query[0..2]);
    response.push(flags_hi);
    response.push(flags_lo);
    response.extend_from_slice(&query[4..6]);
    response.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    response.extend_from_slice(&query[12..]);
    response
}
