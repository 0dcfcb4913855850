//! Forced resync tracking.
//!
//! A book fault marks its alias as recovering. Deltas for a recovering alias
//! are dropped until the next full refresh lands. Requests that see no
//! refresh within the timeout are re-armed and handed back to the caller to
//! re-issue.

use crossbeam_channel::Sender;
use granbook_core::Alias;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Receives requests for a fresh snapshot of an alias.
pub trait ResyncSink: Send + Sync {
    /// Asks the feed for a full refresh of `alias`. Must not block.
    fn request_resync(&self, alias: &Alias);
}

impl ResyncSink for Sender<Alias> {
    fn request_resync(&self, alias: &Alias) {
        if self.try_send(alias.clone()).is_err() {
            tracing::warn!("resync request for {} could not be queued", alias);
        }
    }
}

/// Outstanding resync for one alias.
#[derive(Debug, Clone)]
pub struct RecoveryRequest {
    /// Alias being recovered.
    pub alias: Alias,
    /// Time the current attempt was issued.
    pub created_at: Instant,
    /// Number of snapshot requests issued so far.
    pub attempts: u32,
}

/// Tracks aliases awaiting a full refresh.
pub struct RecoveryManager {
    pending: Vec<RecoveryRequest>,
    recovering: HashSet<Alias>,
    timeout: Duration,
}

impl RecoveryManager {
    /// Creates a new recovery manager.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Vec::new(),
            recovering: HashSet::new(),
            timeout,
        }
    }

    /// Marks an alias as recovering.
    ///
    /// Returns false if a resync for it is already outstanding, in which case
    /// no new snapshot request should be issued.
    pub fn request(&mut self, alias: &Alias) -> bool {
        if !self.recovering.insert(alias.clone()) {
            return false;
        }
        self.pending.push(RecoveryRequest {
            alias: alias.clone(),
            created_at: Instant::now(),
            attempts: 1,
        });
        true
    }

    /// Clears recovery for an alias. Returns true if it was recovering.
    pub fn complete(&mut self, alias: &Alias) -> bool {
        if !self.recovering.remove(alias) {
            return false;
        }
        self.pending.retain(|r| &r.alias != alias);
        true
    }

    /// Returns pending requests.
    #[must_use]
    pub fn pending_requests(&self) -> &[RecoveryRequest] {
        &self.pending
    }

    /// Re-arms requests older than the timeout and returns them.
    ///
    /// Returned aliases stay in recovery; the caller should request a new
    /// snapshot for each.
    pub fn check_timeouts(&mut self) -> Vec<RecoveryRequest> {
        self.check_timeouts_at(Instant::now())
    }

    fn check_timeouts_at(&mut self, now: Instant) -> Vec<RecoveryRequest> {
        let mut expired = Vec::new();
        for request in &mut self.pending {
            if now.saturating_duration_since(request.created_at) > self.timeout {
                request.created_at = now;
                request.attempts += 1;
                expired.push(request.clone());
            }
        }
        expired
    }

    /// Returns true if an alias is recovering.
    #[must_use]
    pub fn is_recovering(&self, alias: &Alias) -> bool {
        self.recovering.contains(alias)
    }

    /// Returns the number of aliases in recovery.
    #[must_use]
    pub fn recovery_count(&self) -> usize {
        self.recovering.len()
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
