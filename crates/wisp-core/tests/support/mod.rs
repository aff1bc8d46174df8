//! Shared test support: an in-memory `RemoteReader`/`RemoteWriter` pair that
//! never touches a real socket, for scenario tests that need to drive the
//! stream pumps without the network. Split into two independent halves from
//! construction, mirroring how a dialed remote is always split before a
//! pump ever sees it (see `wisp_core::dialer`).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use wisp_core::dialer::{RemoteReader, RemoteWriter};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Drained by `recv()`; an empty `Vec`, once the channel closes, signals EOF
/// exactly like a real TCP socket.
pub struct MockReader {
  inbound: mpsc::Receiver<Vec<u8>>,
}

impl RemoteReader for MockReader {
  fn recv(&mut self) -> BoxFuture<'_, std::io::Result<Vec<u8>>> {
    Box::pin(async move {
      match self.inbound.recv().await {
        Some(data) => Ok(data),
        None => Ok(Vec::new()),
      }
    })
  }
}

/// Everything passed to `send()` is pushed onto `sent`, observable through
/// the `sent_rx` returned by `MockRemote::new`.
pub struct MockWriter {
  sent_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RemoteWriter for MockWriter {
  fn send(&mut self, data: Vec<u8>) -> BoxFuture<'_, std::io::Result<()>> {
    Box::pin(async move {
      let _ = self.sent_tx.send(data);
      Ok(())
    })
  }
}

pub struct MockRemote;

impl MockRemote {
  /// Returns the split reader/writer plus the two handles the test uses to
  /// script them: feed bytes in via the returned sender, observe outbound
  /// bytes via the returned receiver.
  pub fn new() -> (
    MockReader,
    MockWriter,
    mpsc::Sender<Vec<u8>>,
    mpsc::UnboundedReceiver<Vec<u8>>,
  ) {
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    (MockReader { inbound: inbound_rx }, MockWriter { sent_tx }, inbound_tx, sent_rx)
  }
}
