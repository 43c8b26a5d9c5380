use ferrous_forward_domain::DomainError;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Large enough for any EDNS payload an upstream may send back.
pub const MAX_UDP_RESPONSE_SIZE: usize = 65_535;

const RECV_BUFFER_SIZE: usize = 256 * 1024;
const SEND_BUFFER_SIZE: usize = 128 * 1024;

fn create_socket(server: SocketAddr) -> std::io::Result<UdpSocket> {
    let (domain, bind_addr) = if server.is_ipv4() {
        (
            Domain::IPV4,
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        )
    } else {
        (
            Domain::IPV6,
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        )
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(SockProtocol::UDP))?;
    socket.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;
    socket.bind(&bind_addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Open a UDP socket connected to `server`, so only its datagrams are received.
pub async fn connect(server: SocketAddr) -> Result<UdpSocket, DomainError> {
    let socket = create_socket(server).map_err(|e| DomainError::from_io(server, &e))?;
    socket
        .connect(server)
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;
    Ok(socket)
}

pub async fn send(
    socket: &UdpSocket,
    server: SocketAddr,
    message_bytes: &[u8],
) -> Result<(), DomainError> {
    let sent = socket
        .send(message_bytes)
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;
    if sent != message_bytes.len() {
        return Err(DomainError::TransportError {
            server: server.to_string(),
            reason: format!("short UDP write: {} of {} bytes", sent, message_bytes.len()),
        });
    }
    Ok(())
}

pub async fn recv(socket: &UdpSocket, server: SocketAddr) -> Result<Vec<u8>, DomainError> {
    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    let len = socket
        .recv(&mut buf)
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;
    buf.truncate(len);
    Ok(buf)
}
