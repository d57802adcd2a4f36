//! Command Handlers module
//!
//! Handlers that orchestrate ledger operations. Each handler loads the
//! aggregates it needs from the event store, asks them for events and
//! appends those events atomically.

mod account_handler;
mod catalog_handler;
mod commands;
mod transfer_engine;
mod user_handler;

pub use account_handler::AccountHandler;
pub use catalog_handler::CatalogHandler;
pub use commands::*;
pub use transfer_engine::{TransferEngine, CODE_EXPIRED_REASON};
pub use user_handler::UserHandler;

use crate::audit::JournalEntry;
use crate::event_store::EventStore;

/// Append a journal entry after a successful commit.
///
/// The ledger change is already durable at this point, so a failure is
/// logged rather than returned.
pub(crate) async fn write_journal(store: &dyn EventStore, entry: JournalEntry) {
    if let Err(e) = store.append_journal(&entry).await {
        tracing::error!(
            event = %entry.event,
            resource_id = ?entry.resource_id,
            error = %e,
            "Failed to write journal entry"
        );
    }
}
