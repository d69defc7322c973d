//! Base connection over a tokio TCP stream.
//!
//! Reads and writes use `try_read` / `try_write`, so they never wait:
//! `WouldBlock` becomes `Ok(0)` and the session's poll loop retries later.

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::observability::logging::ConnectionLogger;
use crate::stream::{Connection, Input, Output, StreamError};

/// A client socket as a non-blocking [`Connection`].
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    logger: ConnectionLogger,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr, logger: ConnectionLogger) -> Self {
        Self {
            stream,
            peer,
            logger,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Input for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.try_read(buf) {
            Ok(0) => Err(StreamError::Closed),
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(StreamError::Io(err)),
        }
    }
}

impl Output for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        match self.stream.try_write(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                ) =>
            {
                Err(StreamError::Closed)
            }
            Err(err) => Err(StreamError::Io(err)),
        }
    }
}

impl Connection for TcpConnection {
    fn log(&self, line: &str) {
        self.logger.log(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use crate::observability::logging::LogFanout;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reads_and_writes_without_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();

        let logger = ConnectionLogger::new(ConnectionId::new(), Arc::new(LogFanout::new()));
        let mut conn = TcpConnection::new(server, peer, logger);

        let mut buf = [0u8; 16];
        assert_eq!(conn.read(&mut buf).unwrap(), 0);

        client.write_all(b"ping").await.unwrap();
        let mut got = 0;
        for _ in 0..100 {
            got = conn.read(&mut buf).unwrap();
            if got > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(&buf[..got], b"ping");

        assert_eq!(conn.write(b"pong").unwrap(), 4);
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");

        drop(client);
        let mut closed = false;
        for _ in 0..100 {
            match conn.read(&mut buf) {
                Err(StreamError::Closed) => {
                    closed = true;
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
        assert!(closed);
    }
}
