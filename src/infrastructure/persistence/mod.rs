//! Durable state persistence.

mod snapshots;

pub use snapshots::{load_latest_snapshot, prune_snapshots, save_snapshot};
