//! Request lifecycle tracking for loads.
//!
//! Every load registers a pending request with its own [`CancelToken`]. For
//! tracked categories the request also becomes the category's *latest*; an
//! older request that resolves after a newer one was issued observes that it
//! is no longer latest and reports [`LoadError::Cancelled`], so the last
//! request issued wins regardless of completion order.
//!
//! Writes go through [`RequestTracker::supersede_key`]: a load of the same key
//! that is still in flight read the value being replaced and must not
//! publish it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use quotesync_core::Category;

use crate::cancel::CancelToken;
use crate::error::LoadError;

/// Identifier of one logical load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug)]
struct Pending {
    category: Category,
    key: String,
    token: CancelToken,
    /// Set when the key was written after the request began.
    stale: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    latest: HashMap<Category, RequestId>,
    pending: HashMap<RequestId, Pending>,
}

/// Records the latest request per category and the tokens of every pending one.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    state: Arc<Mutex<State>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request for `key`.
    ///
    /// For tracked categories the request replaces the previous latest one.
    /// The returned guard unregisters the request when dropped.
    pub fn begin(&self, category: Category, key: &str) -> RequestGuard {
        let token = CancelToken::new();
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = RequestId(state.next_id);

        if category.is_tracked()
            && let Some(previous) = state.latest.insert(category, id)
        {
            tracing::debug!(%category, request_id = %id, superseded = %previous, "request superseded");
        }
        state.pending.insert(id, Pending { category, key: key.to_string(), token: token.clone(), stale: false });

        RequestGuard { state: self.state.clone(), id, category, token }
    }

    /// Whether `id` is still the latest request for `category`.
    ///
    /// Untracked categories have no latest request; every one of their
    /// requests counts as latest.
    pub fn is_latest(&self, category: Category, id: RequestId) -> bool {
        is_latest(&self.state.lock(), category, id)
    }

    /// Forget the latest request for `category` and cancel every pending
    /// request in it. Returns the number of requests cancelled.
    pub fn cancel_category(&self, category: Category) -> usize {
        let mut state = self.state.lock();
        state.latest.remove(&category);

        let mut cancelled = 0;
        for (id, pending) in state.pending.iter().filter(|(_, p)| p.category == category) {
            tracing::debug!(%category, request_id = %id, key = %pending.key, "cancelling pending request");
            pending.token.cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Mark every pending request for `key` stale without cancelling it.
    /// Returns the number of requests marked.
    pub fn supersede_key(&self, key: &str) -> usize {
        let mut state = self.state.lock();
        let mut superseded = 0;
        for (id, pending) in state.pending.iter_mut().filter(|(_, p)| p.key == key) {
            tracing::debug!(request_id = %id, key, "request superseded by write");
            pending.stale = true;
            superseded += 1;
        }
        superseded
    }

    /// Cancel every pending request in every category.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.state.lock();
        state.latest.clear();
        for pending in state.pending.values() {
            pending.token.cancel();
        }
        state.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

fn is_current(state: &State, category: Category, id: RequestId) -> bool {
    is_latest(state, category, id) && state.pending.get(&id).is_some_and(|p| !p.stale)
}

fn is_latest(state: &State, category: Category, id: RequestId) -> bool {
    if !category.is_tracked() {
        return true;
    }
    state.latest.get(&category) == Some(&id)
}

/// A registered request. Unregisters itself on drop.
#[derive(Debug)]
pub struct RequestGuard {
    state: Arc<Mutex<State>>,
    id: RequestId,
    category: Category,
    token: CancelToken,
}

impl RequestGuard {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Token cancelled when the request is explicitly abandoned.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Fail with [`LoadError::Cancelled`] if the request was cancelled or
    /// superseded.
    pub fn check(&self) -> Result<(), LoadError> {
        self.commit(|| ())
    }

    /// Run `publish` if the request is still current.
    ///
    /// The tracker stays locked while `publish` runs, so a concurrent
    /// [`RequestTracker::supersede_key`] either happens before (and `publish`
    /// is skipped) or after it.
    pub fn commit<T>(&self, publish: impl FnOnce() -> T) -> Result<T, LoadError> {
        let state = self.state.lock();
        if self.token.is_cancelled() || !is_current(&state, self.category, self.id) {
            tracing::debug!(category = %self.category, request_id = %self.id, "stale request discarded");
            return Err(LoadError::Cancelled);
        }
        Ok(publish())
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.pending.remove(&self.id);
        if state.latest.get(&self.category) == Some(&self.id) {
            state.latest.remove(&self.category);
        }
    }
}
