//! Review runs: the per-run state machine and the driver that advances it.

pub mod driver;
pub mod state;

pub use driver::{ReviewWorkflow, DEFAULT_NOTIFY_TIMEOUT};
pub use state::{DeliveryOutcome, NotificationRecord, ReviewIssue, ReviewState, Stage, StageChange};
