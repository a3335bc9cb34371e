pub mod cleanup;
pub mod tracking;

pub use cleanup::{CleanupHandle, CleanupSweeper};
pub use tracking::{collect_params, limit_params, now_millis, RecordOutcome, TrackingService};
