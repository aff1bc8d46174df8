//! Uniform interface over TCP and UDP remote sockets, split into independent
//! read and write halves from the moment a remote is dialed — exactly like
//! `TcpStream::into_split`, which is what backs the TCP case. Splitting
//! matters: the ws→remote and remote→ws pumps (`crate::stream`) run
//! concurrently, one typically blocked in a long `recv()` waiting on server
//! data while the other needs to send. A single `Remote` object guarded by
//! one lock would force them to contend for it across that blocking await,
//! deadlocking the relay for any request/response protocol. Splitting up
//! front means each pump owns its half outright and neither ever waits on
//! the other.
//!
//! `recv` returns an empty buffer on EOF (TCP) — UDP has no EOF, so a UDP
//! reader simply blocks until the next datagram arrives and the stream only
//! ends when the caller drops it.
//!
//! Both halves are object-safe (boxed futures rather than return-position
//! `impl Future`) so a session can hold `Box<dyn RemoteReader>` /
//! `Box<dyn RemoteWriter>` and swap in mocks in tests without the
//! stream/session code knowing the difference.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};

/// Bytes read per `recv()` call on a TCP remote, and the datagram buffer
/// size for UDP.
pub const RECV_CHUNK: usize = 65_536;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait RemoteReader: Send {
  fn recv(&mut self) -> BoxFuture<'_, std::io::Result<Vec<u8>>>;
}

pub trait RemoteWriter: Send {
  fn send(&mut self, data: Vec<u8>) -> BoxFuture<'_, std::io::Result<()>>;
}

pub struct TcpReader {
  read_half: OwnedReadHalf,
}

impl RemoteReader for TcpReader {
  fn recv(&mut self) -> BoxFuture<'_, std::io::Result<Vec<u8>>> {
    Box::pin(async move {
      let mut buf = vec![0u8; RECV_CHUNK];
      let n = self.read_half.read(&mut buf).await?;
      buf.truncate(n);
      Ok(buf)
    })
  }
}

pub struct TcpWriter {
  write_half: OwnedWriteHalf,
}

impl RemoteWriter for TcpWriter {
  fn send(&mut self, data: Vec<u8>) -> BoxFuture<'_, std::io::Result<()>> {
    Box::pin(async move { self.write_half.write_all(&data).await })
  }
}

pub struct UdpReader {
  socket: Arc<UdpSocket>,
}

impl RemoteReader for UdpReader {
  fn recv(&mut self) -> BoxFuture<'_, std::io::Result<Vec<u8>>> {
    Box::pin(async move {
      let mut buf = vec![0u8; RECV_CHUNK];
      let n = self.socket.recv(&mut buf).await?;
      buf.truncate(n);
      Ok(buf)
    })
  }
}

pub struct UdpWriter {
  socket: Arc<UdpSocket>,
}

impl RemoteWriter for UdpWriter {
  fn send(&mut self, data: Vec<u8>) -> BoxFuture<'_, std::io::Result<()>> {
    Box::pin(async move {
      self.socket.send(&data).await?;
      Ok(())
    })
  }
}

async fn connect_tcp(addr: SocketAddr) -> std::io::Result<(Box<dyn RemoteReader>, Box<dyn RemoteWriter>)> {
  let stream = TcpStream::connect(addr).await?;
  let (read_half, write_half) = stream.into_split();
  Ok((
    Box::new(TcpReader { read_half }),
    Box::new(TcpWriter { write_half }),
  ))
}

async fn connect_udp(addr: SocketAddr) -> std::io::Result<(Box<dyn RemoteReader>, Box<dyn RemoteWriter>)> {
  let bind_addr: SocketAddr = if addr.is_ipv4() {
    "0.0.0.0:0".parse().unwrap()
  } else {
    "[::]:0".parse().unwrap()
  };
  let socket = UdpSocket::bind(bind_addr).await?;
  socket.connect(addr).await?;
  // `UdpSocket::send`/`recv` take `&self`, so the reader and writer can
  // share one socket via `Arc` with no lock: each is called from exactly
  // one pump, so there's no concurrent-access race to guard against.
  let socket = Arc::new(socket);
  Ok((
    Box::new(UdpReader { socket: socket.clone() }),
    Box::new(UdpWriter { socket }),
  ))
}

/// Resolve + policy-check `host:port` (via [`crate::addr_guard`]) and dial
/// the appropriate transport. The literal address the guard resolved is
/// dialed directly — never the hostname again — to close the TOCTOU
/// DNS-rebind window the guard exists to prevent.
pub async fn connect_stream(
  stream_type: crate::framer::StreamType,
  host: &str,
  port: u16,
  policy: &crate::addr_guard::AddressPolicy,
) -> Result<(Box<dyn RemoteReader>, Box<dyn RemoteWriter>), crate::error::WispError> {
  use crate::framer::StreamType;

  let addr = crate::addr_guard::resolve_and_guard(host, port, stream_type, policy).await?;

  let map_dial_err = |source: std::io::Error| crate::error::WispError::DialFailed {
    host: host.to_string(),
    port,
    source,
  };

  match stream_type {
    StreamType::Tcp => connect_tcp(addr).await.map_err(map_dial_err),
    StreamType::Udp => connect_udp(addr).await.map_err(map_dial_err),
  }
}
