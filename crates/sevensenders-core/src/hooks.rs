//! Extension points around exports.
//!
//! Hooks are registered on a [`HookChain`] and invoked synchronously in
//! registration order. `before_*` hooks may rewrite the outgoing payload;
//! `after_*` hooks observe the result.

use chrono::{DateTime, FixedOffset};

use sevensenders_types::{Order, OrderPayload, ShipmentPayload};

pub trait ExportHook {
    fn name(&self) -> &'static str;

    fn before_order_export(&mut self, _order: &Order, _payload: &mut OrderPayload) {}

    fn after_order_export(&mut self, _order: &Order, _exported: bool) {}

    fn before_shipment_export(&mut self, _order: &Order, _payload: &mut ShipmentPayload) {}

    fn after_shipment_export(&mut self, _order: &Order, _exported: bool) {}

    fn after_delivery_recorded(&mut self, _order: &Order, _delivered_at: DateTime<FixedOffset>) {}
}

/// Ordered list of hooks.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn ExportHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn ExportHook>) {
        tracing::debug!(hook = hook.name(), "registered export hook");
        self.hooks.push(hook);
    }

    pub fn with(mut self, hook: Box<dyn ExportHook>) -> Self {
        self.register(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub(crate) fn before_order_export(&mut self, order: &Order, payload: &mut OrderPayload) {
        for hook in &mut self.hooks {
            hook.before_order_export(order, payload);
        }
    }

    pub(crate) fn after_order_export(&mut self, order: &Order, exported: bool) {
        for hook in &mut self.hooks {
            hook.after_order_export(order, exported);
        }
    }

    pub(crate) fn before_shipment_export(&mut self, order: &Order, payload: &mut ShipmentPayload) {
        for hook in &mut self.hooks {
            hook.before_shipment_export(order, payload);
        }
    }

    pub(crate) fn after_shipment_export(&mut self, order: &Order, exported: bool) {
        for hook in &mut self.hooks {
            hook.after_shipment_export(order, exported);
        }
    }

    pub(crate) fn after_delivery_recorded(&mut self, order: &Order, at: DateTime<FixedOffset>) {
        for hook in &mut self.hooks {
            hook.after_delivery_recorded(order, at);
        }
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.names())
            .finish()
    }
}
