//! Ephemeral storage for the in-flight authorization
//!
//! Holds the CSRF `state` and PKCE verifier between building the
//! authorization URL and handling the callback. Lives only in process
//! memory: a restart forgets it, which bounds how long a leaked
//! state/verifier pair stays useful. Entries also expire after
//! `FLOW_EXPIRY`.
//!
//! The CSRF half is read once: `take_state` hands it out a single time,
//! while the verifier stays until the exchange clears the flow.

use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::credentials::BoxFuture;
use crate::error::Result;

/// Maximum age of a pending authorization before it reads as absent.
pub const FLOW_EXPIRY: Duration = Duration::from_secs(600);

/// The pending authorization: CSRF binding plus PKCE verifier.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub state: String,
    pub code_verifier: Secret<String>,
}

/// Session-scoped, single-slot storage for `FlowState`.
///
/// `store` replaces any previous flow; `clear` is a no-op when empty.
pub trait FlowStore: Send + Sync {
    fn store(&self, flow: FlowState) -> BoxFuture<'_, Result<()>>;

    fn load(&self) -> BoxFuture<'_, Result<Option<FlowState>>>;

    /// The pending CSRF state, at most once per stored flow. Later calls
    /// return `None`; the verifier remains readable through `load`.
    fn take_state(&self) -> BoxFuture<'_, Result<Option<String>>>;

    fn clear(&self) -> BoxFuture<'_, Result<()>>;
}

struct Entry {
    flow: FlowState,
    created: Instant,
    state_taken: bool,
}

/// In-memory flow store with an expiry window.
pub struct MemoryFlowStore {
    slot: Mutex<Option<Entry>>,
    ttl: Duration,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::with_ttl(FLOW_EXPIRY)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }
}

impl MemoryFlowStore {
    /// The live entry, dropping it first if it has expired.
    fn live<'a>(&self, slot: &'a mut Option<Entry>) -> Option<&'a mut Entry> {
        if slot
            .as_ref()
            .is_some_and(|entry| entry.created.elapsed() >= self.ttl)
        {
            debug!("authorization flow expired");
            *slot = None;
        }
        slot.as_mut()
    }
}

impl Default for MemoryFlowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStore for MemoryFlowStore {
    fn store(&self, flow: FlowState) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut slot = self.slot.lock().await;
            if slot.is_some() {
                debug!("replacing stale authorization flow");
            }
            *slot = Some(Entry {
                flow,
                created: Instant::now(),
                state_taken: false,
            });
            Ok(())
        })
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<FlowState>>> {
        Box::pin(async move {
            let mut slot = self.slot.lock().await;
            Ok(self.live(&mut slot).map(|entry| entry.flow.clone()))
        })
    }

    fn take_state(&self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let mut slot = self.slot.lock().await;
            Ok(self.live(&mut slot).and_then(|entry| {
                if entry.state_taken {
                    None
                } else {
                    entry.state_taken = true;
                    Some(entry.flow.state.clone())
                }
            }))
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.slot.lock().await = None;
            Ok(())
        })
    }
}
