//! Live session registry
//!
//! One [`SessionHandle`] exists per connected agent. The registry enforces
//! at most one live session per client ID; registering a new session for a
//! client atomically displaces the previous one, which the caller then
//! closes. Handles carry a serial number so a stale session's close path
//! can never evict the session that replaced it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use drover_core::error::SessionError;
use drover_core::time::{current_time_millis, elapsed_millis};
use drover_core::ClientId;
use drover_protocol::Envelope;

/// State for a single live WebSocket session
pub struct SessionHandle {
    client_id: ClientId,
    serial: u64,
    outbound: mpsc::Sender<Envelope>,
    /// Unix millis of the last heartbeat received on this session
    last_heartbeat: AtomicU64,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Record a heartbeat arrival
    pub fn record_heartbeat(&self) {
        self.last_heartbeat
            .store(current_time_millis(), Ordering::Relaxed);
    }

    /// Milliseconds since the last heartbeat (or since registration)
    pub fn millis_since_heartbeat(&self) -> u64 {
        elapsed_millis(self.last_heartbeat.load(Ordering::Relaxed))
    }

    /// Queue an envelope for the session's writer task.
    ///
    /// Non-blocking: a full queue is surfaced as an error rather than
    /// letting a slow agent stall the dispatcher.
    pub fn try_dispatch(&self, envelope: Envelope) -> Result<(), SessionError> {
        self.outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SessionError::Closed,
        })
    }

    /// Signal the session's tasks to shut down
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token the session's reader and writer tasks select on
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Registry of live sessions indexed by client ID
pub struct SessionRegistry {
    sessions: DashMap<ClientId, Arc<SessionHandle>>,
    next_serial: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Register a new session, displacing any existing one for the same
    /// client. Returns the new handle and the displaced handle, if any;
    /// the caller is responsible for closing the displaced session.
    pub fn register(
        &self,
        client_id: ClientId,
        outbound: mpsc::Sender<Envelope>,
    ) -> (Arc<SessionHandle>, Option<Arc<SessionHandle>>) {
        let handle = Arc::new(SessionHandle {
            client_id: client_id.clone(),
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            outbound,
            last_heartbeat: AtomicU64::new(current_time_millis()),
            cancel: CancellationToken::new(),
        });
        let displaced = self.sessions.insert(client_id, Arc::clone(&handle));
        (handle, displaced)
    }

    /// Remove a session, but only if the given handle is still the one
    /// registered. Returns true when the entry was removed. A session that
    /// was displaced by a reconnect finds a different serial here and
    /// leaves the registry alone.
    pub fn remove(&self, handle: &SessionHandle) -> bool {
        self.sessions
            .remove_if(&handle.client_id, |_, current| {
                current.serial == handle.serial
            })
            .is_some()
    }

    /// Get the live session for a client, if any
    pub fn get(&self, client_id: &ClientId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(client_id).map(|r| Arc::clone(&r))
    }

    /// Snapshot of all live sessions, for the heartbeat monitor
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> mpsc::Sender<Envelope> {
        let (tx, rx) = mpsc::channel(8);
        // Keep the receiver alive for the duration of the test
        std::mem::forget(rx);
        tx
    }

    #[test]
    fn test_register_and_get() {
        let registry = SessionRegistry::new();
        let (handle, displaced) = registry.register(ClientId::new("a1"), channel());
        assert!(displaced.is_none());
        assert_eq!(registry.len(), 1);

        let found = registry.get(&ClientId::new("a1")).unwrap();
        assert_eq!(found.serial, handle.serial);
    }

    #[test]
    fn test_reconnect_displaces_previous_session() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.register(ClientId::new("a1"), channel());
        let (second, displaced) = registry.register(ClientId::new("a1"), channel());

        let displaced = displaced.unwrap();
        assert_eq!(displaced.serial, first.serial);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&ClientId::new("a1")).unwrap().serial, second.serial);
    }

    #[test]
    fn test_stale_remove_leaves_replacement() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.register(ClientId::new("a1"), channel());
        let (_second, _) = registry.register(ClientId::new("a1"), channel());

        // The displaced session's close path must not evict its replacement
        assert!(!registry.remove(&first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_current_session() {
        let registry = SessionRegistry::new();
        let (handle, _) = registry.register(ClientId::new("a1"), channel());
        assert!(registry.remove(&handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_to_full_queue_errors() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let (handle, _) = registry.register(ClientId::new("a1"), tx);

        let envelope = Envelope::Dispatch {
            id: "c1".into(),
            command: "uptime".into(),
        };
        assert!(handle.try_dispatch(envelope.clone()).is_ok());
        assert!(matches!(
            handle.try_dispatch(envelope),
            Err(SessionError::QueueFull)
        ));
    }

    #[test]
    fn test_dispatch_after_receiver_drop_errors() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (handle, _) = registry.register(ClientId::new("a1"), tx);

        let envelope = Envelope::Dispatch {
            id: "c1".into(),
            command: "uptime".into(),
        };
        assert!(matches!(
            handle.try_dispatch(envelope),
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn test_close_sets_cancelled() {
        let registry = SessionRegistry::new();
        let (handle, _) = registry.register(ClientId::new("a1"), channel());
        assert!(!handle.cancelled());
        handle.close();
        assert!(handle.cancelled());
    }
}
