use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod session;

/// Unique identifier for a live WebSocket connection
///
/// Each connection gets its own id when it is created, so one identity with several open tabs
/// holds several handles and each can be removed precisely when its socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection bound to exactly one identity.
///
/// Frames pushed here are forwarded to the socket by the connection's own actor. The handle is
/// alive while that actor still holds the receiving end.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: HandleId,
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

impl ConnectionHandle {
    /// Create a handle for `user_id` together with the receiver its connection task drains.
    pub fn channel(user_id: Uuid) -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let handle = Self {
            id: HandleId::new(),
            user_id,
            sender: tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Best-effort push. Returns false if the connection is already gone.
    pub fn push(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }
}

#[derive(Default)]
struct RegistryInner {
    // user_id -> live handles (one per open tab)
    by_user: HashMap<Uuid, Vec<ConnectionHandle>>,
    // handle_id -> owning user, so unregister needs only the handle
    owners: HashMap<HandleId, Uuid>,
}

/// Process-wide map from authenticated identity to live connection handles
///
/// This is the only shared mutable state on the server. All access goes through these methods,
/// serialized by one lock; a clone is handed to each connection task at spawn time.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to its identity's handle set. Several handles per identity are expected.
    pub async fn register(&self, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let user_id = handle.user_id;
        let handle_id = handle.id;

        guard.owners.insert(handle_id, user_id);
        let handles = guard.by_user.entry(user_id).or_default();
        handles.push(handle);

        tracing::debug!(
            user_id = %user_id,
            handle_id = %handle_id,
            open_handles = handles.len(),
            "registered connection"
        );
    }

    /// Remove a handle. Idempotent: returns false if it was already gone.
    pub async fn unregister(&self, handle_id: HandleId) -> bool {
        let mut guard = self.inner.write().await;

        let Some(user_id) = guard.owners.remove(&handle_id) else {
            return false;
        };

        if let Some(handles) = guard.by_user.get_mut(&user_id) {
            handles.retain(|h| h.id != handle_id);
            let remaining = handles.len();

            // Clean up empty identity entries
            if remaining == 0 {
                guard.by_user.remove(&user_id);
            }

            tracing::debug!(
                user_id = %user_id,
                handle_id = %handle_id,
                remaining,
                "unregistered connection"
            );
        }

        true
    }

    /// Snapshot of the live handles for one identity; may be empty.
    pub async fn handles_for(&self, user_id: Uuid) -> Vec<ConnectionHandle> {
        let guard = self.inner.read().await;
        Self::collect(&guard, &[user_id])
    }

    /// Snapshot for several identities taken under a single lock acquisition.
    pub async fn handles_for_all(&self, user_ids: &[Uuid]) -> Vec<ConnectionHandle> {
        let guard = self.inner.read().await;
        Self::collect(&guard, user_ids)
    }

    fn collect(inner: &RegistryInner, user_ids: &[Uuid]) -> Vec<ConnectionHandle> {
        user_ids
            .iter()
            .filter_map(|id| inner.by_user.get(id))
            .flat_map(|handles| handles.iter().filter(|h| h.is_alive()).cloned())
            .collect()
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.by_user.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        self.inner.read().await.owners.len()
    }
}
