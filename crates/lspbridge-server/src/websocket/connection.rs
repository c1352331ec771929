//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lspbridge_core::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::ClientSendError;

/// One connected WebSocket client.
///
/// Outbound text goes through a bounded queue drained by the session's
/// writer task, so a slow client never blocks the output pump.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    closed: CancellationToken,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around the sending half of its outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text frame for this client without waiting.
    pub fn send(&self, text: Arc<String>) -> Result<(), ClientSendError> {
        if self.closed.is_cancelled() {
            return Err(ClientSendError::Closed);
        }
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(ClientSendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ClientSendError::Closed),
        }
    }

    /// Ask the session to close this client. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolve once the connection is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Record a pong (or any other sign of life) from the client.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Read and clear the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last sign of life.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Time since the connection was established.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_conn(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientConnection::new(ConnectionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn send_delivers_in_order() {
        let (conn, mut rx) = make_conn(8);
        conn.send(Arc::new("a".into())).unwrap();
        conn.send(Arc::new("b".into())).unwrap();
        assert_eq!(rx.recv().await.unwrap().as_str(), "a");
        assert_eq!(rx.recv().await.unwrap().as_str(), "b");
    }

    #[test]
    fn full_queue_reports_full_and_counts() {
        let (conn, _rx) = make_conn(1);
        conn.send(Arc::new("1".into())).unwrap();
        assert_eq!(conn.send(Arc::new("2".into())), Err(ClientSendError::Full));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_after_receiver_dropped_is_closed() {
        let (conn, rx) = make_conn(4);
        drop(rx);
        assert_eq!(conn.send(Arc::new("x".into())), Err(ClientSendError::Closed));
    }

    #[test]
    fn send_after_close_is_closed() {
        let (conn, _rx) = make_conn(4);
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert_eq!(conn.send(Arc::new("x".into())), Err(ClientSendError::Closed));
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let (conn, _rx) = make_conn(1);
        conn.close();
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .unwrap();
    }

    #[test]
    fn check_alive_clears_flag() {
        let (conn, _rx) = make_conn(1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn last_pong_resets_on_mark_alive() {
        let (conn, _rx) = make_conn(1);
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(20));
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_millis(20));
        assert!(conn.age() >= Duration::from_millis(20));
    }
}
