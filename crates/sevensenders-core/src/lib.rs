//! Order export pipeline for Seven Senders.
//!
//! [`Pipeline`] ties a [`SevenSendersApi`](sevensenders_api::SevenSendersApi)
//! implementation to an [`OrderStore`](sevensenders_store::OrderStore) and
//! drives each order through
//! `not exported -> order exported -> shipment exported -> delivered`.
//! Every entry point takes a [`Reporter`] for operator-facing messages and
//! returns a typed outcome instead of failing on API or data problems; only
//! store I/O errors propagate.

pub mod clock;
pub mod export;
pub mod hooks;
pub mod reconcile;
pub mod reporter;
pub mod schedule;

pub use clock::{Clock, FixedClock, SystemClock};
pub use export::{
    ExportOutcome, FailureReason, Pipeline, SkipReason, StatusChangeOutcome, planned_pickup,
    tracking_link, validate_carrier,
};
pub use hooks::{ExportHook, HookChain};
pub use reconcile::{ReconcileOutcome, ReconcileReport};
pub use reporter::Reporter;
pub use schedule::{ScheduledRun, is_due, next_run};

#[cfg(test)]
pub(crate) mod testing;
