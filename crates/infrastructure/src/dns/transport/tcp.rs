use ferrous_forward_domain::DomainError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

pub async fn connect(server: SocketAddr, timeout: Duration) -> Result<TcpStream, DomainError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(server))
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: server.to_string(),
        })?
        .map_err(|e| DomainError::from_io(server, &e))?;

    stream
        .set_nodelay(true)
        .map_err(|e| DomainError::from_io(server, &e))?;

    debug!(server = %server, "TCP connection established");
    Ok(stream)
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    server: SocketAddr,
    message_bytes: &[u8],
) -> Result<(), DomainError>
where
    S: AsyncWrite + Unpin,
{
    if message_bytes.len() > MAX_TCP_MESSAGE_SIZE {
        return Err(DomainError::InvalidDnsQuery(format!(
            "Message too large for TCP: {} bytes",
            message_bytes.len()
        )));
    }

    // One write so the prefix and body leave in the same segment
    let mut framed = Vec::with_capacity(message_bytes.len() + 2);
    framed.extend_from_slice(&(message_bytes.len() as u16).to_be_bytes());
    framed.extend_from_slice(message_bytes);

    stream
        .write_all(&framed)
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;
    stream
        .flush()
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;

    Ok(())
}

pub(crate) async fn read_with_length_prefix<S>(
    stream: &mut S,
    server: SocketAddr,
) -> Result<Vec<u8>, DomainError>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;

    let response_len = u16::from_be_bytes(len_buf) as usize;

    let mut response = vec![0u8; response_len];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| DomainError::from_io(server, &e))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> SocketAddr {
        "127.0.0.1:53".parse().unwrap()
    }

    #[tokio::test]
    async fn test_length_prefix_framing() {
        let (mut client, mut peer) = tokio::io::duplex(1024);

        send_with_length_prefix(&mut client, server(), b"hello")
            .await
            .unwrap();

        let mut raw = [0u8; 7];
        peer.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw, &[0, 5, b'h', b'e', b'l', b'l', b'o']);

        peer.write_all(&[0, 3, 1, 2, 3]).await.unwrap();
        let read = read_with_length_prefix(&mut client, server()).await.unwrap();
        assert_eq!(read, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_eof_mid_message_fails() {
        let (mut client, mut peer) = tokio::io::duplex(64);
        peer.write_all(&[0, 10, 1, 2]).await.unwrap();
        drop(peer);

        let result = read_with_length_prefix(&mut client, server()).await;
        assert!(result.unwrap_err().is_transport_error());
    }
}
