//! Keeps a handle on every native connection a call creates.
//!
//! A link only reaches the link manager's table once its first local
//! description exists. Leaving while an offer or answer is still being built
//! would otherwise leak that connection, so the coordinator wraps its factory
//! in a [`ConnectionTracker`] and sweeps it on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use meshcall_shared::protocol::{IceCandidate, SessionDescription};
use meshcall_shared::types::ParticipantId;

use crate::error::LinkError;
use crate::native::{LocalTrack, NativeEventSink, PeerConnection, PeerConnectionFactory};

pub struct ConnectionTracker {
    inner: Arc<dyn PeerConnectionFactory>,
    live: Mutex<Vec<Arc<TrackedConnection>>>,
}

impl ConnectionTracker {
    pub fn new(inner: Arc<dyn PeerConnectionFactory>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            live: Mutex::new(Vec::new()),
        })
    }

    /// Number of created connections not closed yet.
    pub fn open_count(&self) -> usize {
        self.lock().iter().filter(|c| !c.is_closed()).count()
    }

    /// Close every connection that is still open. Connections already closed
    /// through their link are not closed again.
    ///
    /// Returns how many connections this call closed.
    pub async fn close_all(&self) -> usize {
        let live: Vec<_> = std::mem::take(&mut *self.lock());
        let mut closed = 0;
        for conn in live.into_iter().filter(|c| !c.is_closed()) {
            debug!(remote = %conn.remote.short(), "Closing connection left without a link");
            if let Err(e) = conn.close().await {
                warn!(remote = %conn.remote.short(), error = %e, "Failed to close native connection");
            }
            closed += 1;
        }
        closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<TrackedConnection>>> {
        // A poisoned list is still a valid list.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PeerConnectionFactory for ConnectionTracker {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: NativeEventSink,
    ) -> Result<Arc<dyn PeerConnection>, LinkError> {
        let conn = Arc::new(TrackedConnection {
            remote: remote.clone(),
            inner: self.inner.create(remote, events).await?,
            closed: AtomicBool::new(false),
        });
        let mut live = self.lock();
        live.retain(|c| !c.is_closed());
        live.push(conn.clone());
        Ok(conn)
    }
}

/// Delegates to the native connection; closes it at most once.
struct TrackedConnection {
    remote: ParticipantId,
    inner: Arc<dyn PeerConnection>,
    closed: AtomicBool,
}

impl TrackedConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for TrackedConnection {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), LinkError> {
        self.inner.add_track(track).await
    }

    async fn create_offer(&self) -> Result<SessionDescription, LinkError> {
        self.inner.create_offer().await
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        self.inner.create_answer().await
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), LinkError> {
        self.inner.set_remote_description(description).await
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), LinkError> {
        self.inner.add_ice_candidate(candidate).await
    }

    async fn close(&self) -> Result<(), LinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.close().await
    }
}
