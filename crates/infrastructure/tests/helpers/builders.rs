#![allow(dead_code)]
use ferrous_forward_domain::{ClientTransport, DnsRequest, ZoneName};
use ferrous_forward_infrastructure::dns::{
    ForwardMetrics, Forwarder, ForwarderOptions, Proxy, ProxyOptions, UpstreamTarget,
};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use std::net::SocketAddr;
use std::time::Duration;

pub fn query_wire(id: u16, name: &str) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(id);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));

    let mut buf = Vec::new();
    message.emit(&mut BinEncoder::new(&mut buf)).unwrap();
    buf
}

pub fn request(id: u16, name: &str) -> DnsRequest {
    DnsRequest::new(
        id,
        ZoneName::new(name),
        1,
        query_wire(id, name),
        "127.0.0.1:40000".parse().unwrap(),
        ClientTransport::Udp,
    )
}

/// Same query as [`request`], received from a TCP client.
pub fn request_over_tcp(id: u16, name: &str) -> DnsRequest {
    DnsRequest {
        transport: ClientTransport::Tcp,
        ..request(id, name)
    }
}

/// A loopback address nobody listens on.
pub async fn closed_port() -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.local_addr().unwrap()
}

pub struct ForwarderBuilder {
    from: ZoneName,
    upstreams: Vec<SocketAddr>,
    options: ForwarderOptions,
    proxy_options: ProxyOptions,
    metrics: ForwardMetrics,
}

impl ForwarderBuilder {
    pub fn new(upstreams: &[SocketAddr]) -> Self {
        Self {
            from: ZoneName::root(),
            upstreams: upstreams.to_vec(),
            options: ForwarderOptions {
                read_timeout: Duration::from_millis(500),
                write_timeout: Duration::from_millis(500),
                ..ForwarderOptions::default()
            },
            proxy_options: ProxyOptions {
                dial_timeout: Duration::from_millis(500),
                ..ProxyOptions::default()
            },
            metrics: ForwardMetrics::new(),
        }
    }

    pub fn from_zone(mut self, zone: &str) -> Self {
        self.from = ZoneName::new(zone);
        self
    }

    pub fn max_fails(mut self, max_fails: u32) -> Self {
        self.options.max_fails = max_fails;
        self
    }

    pub fn force_tcp(mut self) -> Self {
        self.options.force_tcp = true;
        self.proxy_options.force_tcp = true;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.options.read_timeout = timeout;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.proxy_options.health_check_interval = interval;
        self
    }

    pub fn metrics(&self) -> ForwardMetrics {
        self.metrics.clone()
    }

    pub fn build(self) -> Forwarder {
        let proxies = self
            .upstreams
            .iter()
            .map(|addr| {
                Proxy::new(
                    UpstreamTarget::new(*addr, None, self.metrics.clone()),
                    &self.proxy_options,
                )
            })
            .collect();
        Forwarder::new(self.from, proxies, self.options).with_metrics(self.metrics)
    }
}
