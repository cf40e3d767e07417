//! Access-revocation list for the latch security core.
//!
//! A capacity-bounded blacklist of `(user, app)` delegations, persisted as a
//! JSON array in the device settings store. Tokens minted before an entry's
//! revocation time are dead on arrival; overflow folds evicted entries into a
//! wildcard cut-off so old tokens stay dead even after their entry is gone.

mod entry;
mod error;
mod store;

pub use entry::RevocationEntry;
pub use error::RevocationError;
pub use store::{AccessRevocationStore, BlockDone, EntryAddedCallback, BLACK_LIST_KEY};
