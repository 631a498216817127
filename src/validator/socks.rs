//! SOCKS4 and SOCKS5 detection handshakes
//!
//! Both handshakes ask the candidate to CONNECT to a fixed loopback target and
//! only inspect the status byte of the reply. Nothing is relayed afterwards.

use std::net::Ipv4Addr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HunterError, Result};

/// Target the candidate is asked to connect to
pub const TEST_TARGET_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
pub const TEST_TARGET_PORT: u16 = 80;

const SOCKS5_VERSION: u8 = 0x05;
const SOCKS4_VERSION: u8 = 0x04;
const CMD_CONNECT: u8 = 0x01;
const METHOD_NO_AUTH: u8 = 0x00;
const ATYP_IPV4: u8 = 0x01;
const SOCKS5_SUCCEEDED: u8 = 0x00;
const SOCKS4_GRANTED: u8 = 0x5A;

const SOCKS5_REPLY_MAX: usize = 10;
const SOCKS4_REPLY_MAX: usize = 8;

pub fn socks5_greeting() -> [u8; 3] {
    [SOCKS5_VERSION, 0x01, METHOD_NO_AUTH]
}

pub fn socks5_connect_request(ip: Ipv4Addr, port: u16) -> Vec<u8> {
    let mut req = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00, ATYP_IPV4];
    req.extend_from_slice(&ip.octets());
    req.extend_from_slice(&port.to_be_bytes());
    req
}

pub fn socks4_connect_request(ip: Ipv4Addr, port: u16) -> Vec<u8> {
    let mut req = vec![SOCKS4_VERSION, CMD_CONNECT];
    req.extend_from_slice(&port.to_be_bytes());
    req.extend_from_slice(&ip.octets());
    // Empty user id
    req.push(0x00);
    req
}

/// Run the SOCKS5 no-auth greeting and CONNECT to the test target
pub async fn socks5_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&socks5_greeting()).await?;
    stream.flush().await?;

    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.map_err(|e| {
        HunterError::HandshakeFailed(format!("SOCKS5 greeting reply: {}", e))
    })?;
    if method[0] != SOCKS5_VERSION {
        return Err(HunterError::HandshakeFailed(format!(
            "SOCKS5 greeting answered with version {:#04x}",
            method[0]
        )));
    }

    stream
        .write_all(&socks5_connect_request(TEST_TARGET_IP, TEST_TARGET_PORT))
        .await?;
    stream.flush().await?;

    let reply = read_reply(stream, SOCKS5_REPLY_MAX).await?;
    if reply.len() >= 2 && reply[1] == SOCKS5_SUCCEEDED {
        Ok(())
    } else {
        Err(HunterError::HandshakeFailed(format!(
            "SOCKS5 CONNECT rejected: {:02x?}",
            reply
        )))
    }
}

/// Send a SOCKS4 CONNECT to the test target
pub async fn socks4_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&socks4_connect_request(TEST_TARGET_IP, TEST_TARGET_PORT))
        .await?;
    stream.flush().await?;

    let reply = read_reply(stream, SOCKS4_REPLY_MAX).await?;
    if reply.len() >= 2 && reply[1] == SOCKS4_GRANTED {
        Ok(())
    } else {
        Err(HunterError::HandshakeFailed(format!(
            "SOCKS4 CONNECT rejected: {:02x?}",
            reply
        )))
    }
}

/// Read until at least two bytes arrived, EOF, or `max` bytes
async fn read_reply<S>(stream: &mut S, max: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max];
    let mut filled = 0;

    while filled < 2 {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_request_layouts() {
        assert_eq!(socks5_greeting(), [0x05, 0x01, 0x00]);
        assert_eq!(
            socks5_connect_request(TEST_TARGET_IP, TEST_TARGET_PORT),
            vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50]
        );
        assert_eq!(
            socks4_connect_request(TEST_TARGET_IP, TEST_TARGET_PORT),
            vec![0x04, 0x01, 0x00, 0x50, 127, 0, 0, 1, 0x00]
        );
    }

    #[tokio::test]
    async fn test_socks5_success() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .read(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();

        assert!(socks5_handshake(&mut stream).await.is_ok());
    }

    #[tokio::test]
    async fn test_socks5_two_byte_reply_is_enough() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .read(&[0x05, 0x00])
            .build();

        assert!(socks5_handshake(&mut stream).await.is_ok());
    }

    #[tokio::test]
    async fn test_socks5_wrong_greeting_version() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x04, 0x00])
            .build();

        let err = socks5_handshake(&mut stream).await.unwrap_err();
        assert!(matches!(err, HunterError::HandshakeFailed(_)));
    }

    #[tokio::test]
    async fn test_socks5_connect_refused() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .read(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();

        let err = socks5_handshake(&mut stream).await.unwrap_err();
        assert!(matches!(err, HunterError::HandshakeFailed(_)));
    }

    #[tokio::test]
    async fn test_socks5_short_connect_reply() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .read(&[0x05])
            .build();

        assert!(socks5_handshake(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn test_socks4_granted() {
        let mut stream = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 127, 0, 0, 1, 0x00])
            .read(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0])
            .build();

        assert!(socks4_handshake(&mut stream).await.is_ok());
    }

    #[tokio::test]
    async fn test_socks4_rejected() {
        let mut stream = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 127, 0, 0, 1, 0x00])
            .read(&[0x00, 0x5B, 0, 0, 0, 0, 0, 0])
            .build();

        let err = socks4_handshake(&mut stream).await.unwrap_err();
        assert!(matches!(err, HunterError::HandshakeFailed(_)));
    }

    #[tokio::test]
    async fn test_socks4_reply_split_across_reads() {
        let mut stream = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 127, 0, 0, 1, 0x00])
            .read(&[0x00])
            .read(&[0x5A])
            .build();

        assert!(socks4_handshake(&mut stream).await.is_ok());
    }
}
