//! The bounded, persisted revocation list.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use latch_provider::{Clock, ConfigStore, SaveDone};

use crate::entry::StoredEntry;
use crate::{RevocationEntry, RevocationError};

/// Settings key the revocation array persists under.
pub const BLACK_LIST_KEY: &str = "black_list";

/// Completion callback for [`AccessRevocationStore::block`].
///
/// Receives the persistence outcome; may run synchronously on the caller's
/// stack.
pub type BlockDone = Box<dyn FnOnce(Result<(), RevocationError>) + Send>;

/// Observer invoked after every successful block.
pub type EntryAddedCallback = Box<dyn Fn() + Send + Sync>;

/// Capacity-bounded revocation list, loaded from and persisted to the
/// settings store.
///
/// When the list is full, the entry closest to its own expiry is folded into
/// a single wildcard cut-off entry, so callers that were never explicitly
/// listed still lose every token issued before the lowest resident
/// revocation time.
pub struct AccessRevocationStore {
    config_store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    entries: Mutex<Vec<RevocationEntry>>,
    entry_added_listeners: Mutex<Vec<EntryAddedCallback>>,
}

impl AccessRevocationStore {
    /// Capacity used by devices that do not override it.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Load the persisted list, dropping entries that have already lapsed.
    ///
    /// A missing or structurally malformed blob starts the list empty; the
    /// next successful block overwrites it. If the load dropped anything, the
    /// trimmed array is written back immediately.
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let store = Self {
            config_store,
            clock,
            capacity: capacity.max(1),
            entries: Mutex::new(Vec::new()),
            entry_added_listeners: Mutex::new(Vec::new()),
        };

        let Some(raw) = store.config_store.load_settings(BLACK_LIST_KEY) else {
            return store;
        };
        if raw.is_empty() {
            return store;
        }

        let stored: Vec<StoredEntry> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(%err, "revocation list blob malformed, starting empty");
                return store;
            }
        };

        let loaded = stored.len();
        let live: Vec<RevocationEntry> = stored
            .iter()
            .filter_map(StoredEntry::decode)
            .filter(|entry| entry.expires_at > now)
            .collect();

        let dropped = loaded - live.len();
        info!(kept = live.len(), dropped, "revocation list loaded");
        let json = serialize(&live);
        *store.entries.lock().unwrap() = live;
        if dropped > 0 {
            store.config_store.save_settings(BLACK_LIST_KEY, json, None);
        }
        store
    }

    /// Register an observer for successful blocks.
    pub fn on_entry_added(&self, listener: EntryAddedCallback) {
        self.entry_added_listeners.lock().unwrap().push(listener);
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the resident entries, insertion order.
    pub fn entries(&self) -> Vec<RevocationEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Add (or refresh) a revocation and persist the list.
    ///
    /// An entry that is already past its expiry is rejected through `done`
    /// without touching the list. An entry with the same `(user, app)` pair
    /// replaces the existing one. `done` receives the persistence outcome
    /// unchanged and may run before `block` returns.
    pub fn block(&self, entry: RevocationEntry, done: Option<BlockDone>) {
        let now = self.clock.now();
        if entry.expires_at <= now {
            debug!("rejecting revocation entry that is already expired");
            if let Some(done) = done {
                done(Err(RevocationError::AlreadyExpired));
            }
            return;
        }

        let json = {
            let mut entries = self.entries.lock().unwrap();
            entries.retain(|resident| resident.expires_at > now);
            entries.retain(|resident| {
                !(resident.user_id == entry.user_id && resident.app_id == entry.app_id)
            });
            entries.push(entry);
            while entries.len() > self.capacity {
                fold_oldest_into_cutoff(&mut entries);
            }
            info!(entries = entries.len(), "revocation entry recorded");
            serialize(&entries)
        };

        let done: Option<SaveDone> = done.map(|done| -> SaveDone {
            Box::new(move |result| done(result.map_err(RevocationError::from)))
        });
        self.config_store.save_settings(BLACK_LIST_KEY, json, done);

        let listeners = self.entry_added_listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener();
        }
    }

    /// True iff a live entry matches both ids and the delegation was created
    /// before that entry's revocation time.
    pub fn is_blocked(
        &self,
        user_id: &[u8],
        app_id: &[u8],
        delegation_time: DateTime<Utc>,
    ) -> bool {
        let now = self.clock.now();
        self.entries.lock().unwrap().iter().any(|entry| {
            entry.expires_at > now
                && entry.matches(user_id, app_id)
                && delegation_time < entry.revoked_at
        })
    }
}

/// Evict the non-wildcard entry nearest its own expiry and fold its effect
/// into the wildcard cut-off entry.
///
/// The cut-off lands one second past the victim's revocation so everything
/// the victim blocked stays blocked. Ties go to the smaller revocation time,
/// then to the earlier-seen entry. The wildcard itself is never a victim.
fn fold_oldest_into_cutoff(entries: &mut Vec<RevocationEntry>) {
    let victim_index = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_wildcard())
        .min_by_key(|(index, entry)| (entry.expires_at, entry.revoked_at, *index))
        .map(|(index, _)| index);
    let Some(victim_index) = victim_index else {
        return;
    };

    let victim = entries.remove(victim_index);
    let cutoff_revocation = victim.revoked_at + Duration::seconds(1);
    debug!(
        cutoff = cutoff_revocation.timestamp(),
        "revocation list full, folding oldest entry into wildcard cut-off"
    );

    match entries.iter_mut().find(|entry| entry.is_wildcard()) {
        Some(cutoff) => {
            if cutoff_revocation > cutoff.revoked_at {
                cutoff.revoked_at = cutoff_revocation;
            }
            if victim.expires_at > cutoff.expires_at {
                cutoff.expires_at = victim.expires_at;
            }
        }
        None => entries.push(RevocationEntry::wildcard(
            cutoff_revocation,
            victim.expires_at,
        )),
    }
}

fn serialize(entries: &[RevocationEntry]) -> String {
    let stored: Vec<StoredEntry> = entries.iter().map(StoredEntry::from).collect();
    serde_json::to_string(&stored).expect("revocation entries always serialize")
}
