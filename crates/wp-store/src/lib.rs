//! Durable per-run storage: the append-only event log, atomic JSON
//! receipt/envelope/snapshot writes, and a bounded in-memory run index with
//! SSE fan-out.

pub mod atomic;
pub mod event_log;
pub mod index;
pub mod layout;

pub use atomic::{read_json, write_json_atomic};
pub use event_log::EventLog;
pub use index::{RunIndex, RunSummary};
pub use layout::RunLayout;
