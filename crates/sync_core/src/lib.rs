//! Delivery and application of events on the primary device.
//!
//! Producers ([`Channel`] implementations) forward [`Delivery`] items into one
//! queue; a single [`EventApplier`] drains it and applies each event at most
//! once through the [`LocalStore`] ledger.

pub mod applier;
pub mod channel;
pub mod ledger;
pub mod push;
pub mod reconciliation;
pub mod scheduler;

pub use applier::{ApplierStats, ApplyError, ApplyOutcome, EventApplier, SkipReason};
pub use channel::{Broadcaster, Channel, ChannelError, Delivery};
pub use ledger::{
    CommitOutcome, DedupLedger, DedupRecord, DomainMutation, LocalStore, NewProgressSession,
    NewProject, SyncStateStore,
};
pub use push::PushChannel;
pub use reconciliation::{CloudStore, DirCloudStore, ReconciliationChannel};
pub use scheduler::{is_due, ReconciliationScheduler, TickOutcome};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
