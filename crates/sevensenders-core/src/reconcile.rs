//! Delivery date reconciliation.
//!
//! Exported orders without a delivery date are matched by order number
//! against the remote order list for the same creation window; the first
//! remote state-history entry in the completed state becomes the local
//! delivery date.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use sevensenders_api::SevenSendersApi;
use sevensenders_store::OrderStore;
use sevensenders_types::{OrderQuery, RemoteOrder};

use crate::export::{FailureReason, Pipeline, SkipReason};
use crate::reporter::Reporter;

/// Counters of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Local orders awaiting a delivery date.
    pub checked: usize,
    /// Local orders found in the remote list.
    pub matched: usize,
    /// Local orders that received a delivery date.
    pub backfilled: usize,
    /// Local orders missing from the remote list.
    pub unmatched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Delivery date tracking is turned off.
    Disabled,
    Skipped(SkipReason),
    Failed(FailureReason),
    Completed(ReconcileReport),
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Disabled => write!(f, "delivery date tracking disabled"),
            ReconcileOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            ReconcileOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            ReconcileOutcome::Completed(report) => write!(
                f,
                "checked {}, matched {}, backfilled {}, unmatched {}",
                report.checked, report.matched, report.backfilled, report.unmatched
            ),
        }
    }
}

impl<A: SevenSendersApi, S: OrderStore> Pipeline<A, S> {
    /// Backfill delivery dates of recently exported orders.
    pub fn reconcile(&mut self, reporter: &mut dyn Reporter) -> Result<ReconcileOutcome> {
        if !self.config.delivery_tracking_enabled() {
            reporter.info("delivery date tracking is disabled; nothing to reconcile");
            return Ok(ReconcileOutcome::Disabled);
        }
        if let Err(reason) = self.require_settings(reporter) {
            return Ok(ReconcileOutcome::Skipped(reason));
        }

        let now = self.clock.now();
        let Some(since) = now.checked_sub_signed(self.config.reconciliation_window()) else {
            let reason = format!(
                "delivery.window_days: {} days before {} is out of range",
                self.config.reconciliation_window().num_days(),
                now.to_rfc3339()
            );
            reporter.error(&reason);
            return Ok(ReconcileOutcome::Skipped(SkipReason::InvalidSettings(reason)));
        };
        let completed_state = self.config.completed_state().to_string();

        let pending = self.store.orders_missing_delivery(since, now)?;
        let mut report = ReconcileReport {
            window_start: since,
            window_end: now,
            checked: pending.len(),
            matched: 0,
            backfilled: 0,
            unmatched: 0,
        };

        if pending.is_empty() {
            reporter.info("no exported orders are awaiting a delivery date");
            self.store.set_last_reconciled_at(now)?;
            return Ok(ReconcileOutcome::Completed(report));
        }

        let query = OrderQuery {
            created_after: since,
            created_before: now,
        };
        let remote = match self.api.list_orders(&query) {
            Ok(remote) => remote,
            Err(err) => {
                reporter.error(&format!("could not list remote orders: {err}"));
                return Ok(ReconcileOutcome::Failed(FailureReason::Api(err.to_string())));
            }
        };
        tracing::debug!(local = pending.len(), remote = remote.len(), "matching orders");

        let mut by_number: HashMap<&str, &RemoteOrder> = HashMap::with_capacity(remote.len());
        for order in &remote {
            by_number.entry(order.order_id.as_str()).or_insert(order);
        }

        for record in pending {
            let Some(remote_order) = by_number.get(record.order.number.as_str()) else {
                report.unmatched += 1;
                continue;
            };
            report.matched += 1;

            let Some(delivered_at) = remote_order.first_entered(&completed_state) else {
                continue;
            };
            if record.tracking.delivered_at.is_some() {
                continue;
            }

            let mut tracking = record.tracking;
            tracking.delivered_at = Some(delivered_at);
            self.store.save_tracking(record.order.id, &tracking)?;
            self.hooks
                .after_delivery_recorded(&record.order, delivered_at);
            reporter.info(&format!(
                "order {} delivered at {}",
                record.order.number,
                delivered_at.to_rfc3339()
            ));
            report.backfilled += 1;
        }

        self.store.set_last_reconciled_at(now)?;
        let outcome = ReconcileOutcome::Completed(report);
        reporter.info(&format!("reconciliation finished: {outcome}"));
        Ok(outcome)
    }
}
