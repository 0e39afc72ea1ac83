// Render coalescing
//
// Deduplicates concurrent renders of the same fingerprint:
// - First job to miss the store (leader): renders, stores the result, signals completion
// - Identical jobs arriving meanwhile (followers): wait for the leader, then re-read the store
// - If the leader failed, followers render for themselves

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Progress of an in-flight render as seen by followers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaderState {
    Rendering,
    Succeeded,
    Failed,
}

/// Tracks in-flight renders keyed by fingerprint
#[derive(Debug, Clone, Default)]
pub struct RenderCoalescer {
    in_flight: Arc<Mutex<HashMap<String, watch::Sender<LeaderState>>>>,
}

impl RenderCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a coalescing slot for a fingerprint
    ///
    /// Returns `CoalescingSlot::Leader` if no render for `fingerprint` is in
    /// flight. Otherwise waits for the current leader to finish and returns
    /// `CoalescingSlot::Follower`.
    pub async fn acquire(&self, fingerprint: &str) -> CoalescingSlot {
        let receiver = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(fingerprint) {
                Some(sender) => sender.subscribe(),
                None => {
                    let (sender, _receiver) = watch::channel(LeaderState::Rendering);
                    in_flight.insert(fingerprint.to_string(), sender.clone());
                    return CoalescingSlot::Leader(LeaderGuard {
                        fingerprint: fingerprint.to_string(),
                        coalescer: self.clone(),
                        sender,
                        outcome: LeaderState::Failed,
                    });
                }
            }
        };

        let mut receiver = receiver;
        let state = receiver
            .wait_for(|state| *state != LeaderState::Rendering)
            .await
            .map(|state| *state)
            .unwrap_or(LeaderState::Failed);

        CoalescingSlot::Follower {
            leader_succeeded: state == LeaderState::Succeeded,
        }
    }

    /// Number of renders currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn remove_in_flight(&self, fingerprint: &str) {
        self.in_flight.lock().remove(fingerprint);
    }
}

/// Result of acquiring a coalescing slot
#[derive(Debug)]
pub enum CoalescingSlot {
    /// No identical render in flight: render, store, then mark the guard
    /// succeeded. Dropping the guard releases the followers.
    Leader(LeaderGuard),

    /// An identical render finished while we waited.
    Follower { leader_succeeded: bool },
}

impl CoalescingSlot {
    pub fn is_leader(&self) -> bool {
        matches!(self, CoalescingSlot::Leader(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, CoalescingSlot::Follower { .. })
    }
}

/// Guard held by the leader render
///
/// Dropped without [`LeaderGuard::succeed`] it reports failure, so followers
/// fall back to rendering themselves.
#[derive(Debug)]
pub struct LeaderGuard {
    fingerprint: String,
    coalescer: RenderCoalescer,
    sender: watch::Sender<LeaderState>,
    outcome: LeaderState,
}

impl LeaderGuard {
    /// Mark the render stored and release followers
    pub fn succeed(mut self) {
        self.outcome = LeaderState::Succeeded;
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        // Unregister first so late arrivals become the next leader instead of
        // subscribing to a finished render
        self.coalescer.remove_in_flight(&self.fingerprint);
        let _ = self.sender.send(self.outcome);
    }
}
