//! Order and shipment export.

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveTime, Weekday};

use sevensenders_api::SevenSendersApi;
use sevensenders_config::Config;
use sevensenders_store::OrderStore;
use sevensenders_types::{
    Carrier, CarrierRef, Order, OrderPayload, OrderStatePayload, OrderStatus, STATE_IN_PREPARATION,
    ShipmentPayload,
};

use crate::clock::{Clock, SystemClock};
use crate::hooks::HookChain;
use crate::reporter::Reporter;

/// Result of a single export step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported,
    AlreadyExported,
    Skipped(SkipReason),
    Failed(FailureReason),
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportOutcome::Exported | ExportOutcome::AlreadyExported)
    }
}

impl std::fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportOutcome::Exported => write!(f, "exported"),
            ExportOutcome::AlreadyExported => write!(f, "already exported"),
            ExportOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            ExportOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Why an export step did not run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("required settings missing: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("order {0} not found")]
    UnknownOrder(u64),
    #[error("order contains only virtual downloadable items")]
    NoProcessingNeeded,
    #[error("order has not been exported yet")]
    OrderNotExported,
    #[error("no shipping carrier recorded")]
    MissingCarrier,
    #[error("no tracking code recorded")]
    MissingTrackingCode,
}

/// Why an export step ran but did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("API request failed: {0}")]
    Api(String),
    #[error("carrier '{0}' is not supported")]
    UnknownCarrier(String),
    #[error("carrier '{carrier}' does not ship to '{country}'")]
    UnsupportedDestination { carrier: String, country: String },
}

/// What a status transition triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusChangeOutcome {
    pub order: Option<ExportOutcome>,
    pub shipment: Option<ExportOutcome>,
}

/// Public tracking page of an order.
///
/// ```
/// use sevensenders_core::tracking_link;
///
/// assert_eq!(tracking_link("https://track.example.com/", "1042"), "https://track.example.com/1042");
/// assert_eq!(tracking_link("https://track.example.com", "1042"), "https://track.example.com/1042");
/// ```
pub fn tracking_link(base_url: &str, order_number: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), order_number)
}

/// Look up `carrier` by code and check it ships to `country` (uppercased).
pub fn validate_carrier<'a>(
    carriers: &'a [Carrier],
    carrier: &str,
    country: &str,
) -> Result<&'a Carrier, FailureReason> {
    let found = carriers
        .iter()
        .find(|c| c.code == carrier)
        .ok_or_else(|| FailureReason::UnknownCarrier(carrier.to_string()))?;

    if !found.serves(country) {
        return Err(FailureReason::UnsupportedDestination {
            carrier: carrier.to_string(),
            country: country.to_string(),
        });
    }
    Ok(found)
}

/// Noon of the first weekday strictly after the local date of `now`.
pub fn planned_pickup(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let mut date = now.date_naive() + Days::new(1);
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date = date + Days::new(1);
    }
    let local = date.and_time(NaiveTime::MIN + chrono::Duration::hours(12));
    let offset = *now.offset();
    let utc = local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

struct RequiredSettings {
    tracking_page_base_url: String,
    offset: FixedOffset,
}

/// Drives orders through export against an API and a store.
pub struct Pipeline<A, S> {
    pub(crate) config: Config,
    pub(crate) api: A,
    pub(crate) store: S,
    pub(crate) hooks: HookChain,
    pub(crate) clock: Box<dyn Clock>,
}

impl<A, S> Pipeline<A, S> {
    pub fn new(config: Config, api: A, store: S) -> Self {
        Self {
            config,
            api,
            store,
            hooks: HookChain::new(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn hooks_mut(&mut self) -> &mut HookChain {
        &mut self.hooks
    }

    pub fn into_parts(self) -> (A, S) {
        (self.api, self.store)
    }
}

impl<A: SevenSendersApi, S: OrderStore> Pipeline<A, S> {
    /// Short-circuits every entry point when settings are incomplete.
    pub(crate) fn require_settings(
        &self,
        reporter: &mut dyn Reporter,
    ) -> Result<(), SkipReason> {
        let missing = self.config.missing_required();
        if missing.is_empty() {
            return Ok(());
        }
        for name in &missing {
            reporter.error(&format!("required setting '{name}' is not configured"));
        }
        Err(SkipReason::MissingSettings(missing))
    }

    fn required_settings(
        &self,
        reporter: &mut dyn Reporter,
    ) -> Result<RequiredSettings, SkipReason> {
        self.require_settings(reporter)?;

        let tracking_page_base_url = self
            .config
            .tracking_page_base_url()
            .unwrap_or_default()
            .to_string();
        let offset = self.config.shop_offset().map_err(|err| {
            reporter.error(&format!("shop.utc_offset: {err:#}"));
            SkipReason::InvalidSettings(format!("{err:#}"))
        })?;

        Ok(RequiredSettings {
            tracking_page_base_url,
            offset,
        })
    }

    fn load_order(
        &self,
        order_id: u64,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<sevensenders_types::OrderRecord>> {
        let record = self.store.get(order_id)?;
        if record.is_none() {
            reporter.error(&format!("order {order_id} not found in {}", self.store.location()));
        }
        Ok(record)
    }

    /// Export an order and store its tracking link.
    pub fn export_order(
        &mut self,
        order_id: u64,
        reporter: &mut dyn Reporter,
    ) -> Result<ExportOutcome> {
        let settings = match self.required_settings(reporter) {
            Ok(settings) => settings,
            Err(reason) => return Ok(ExportOutcome::Skipped(reason)),
        };
        let Some(record) = self.load_order(order_id, reporter)? else {
            return Ok(ExportOutcome::Skipped(SkipReason::UnknownOrder(order_id)));
        };
        let order = record.order;
        let mut tracking = record.tracking;

        if tracking.order_exported {
            reporter.info(&format!("order {} already exported", order.number));
            return Ok(ExportOutcome::AlreadyExported);
        }
        if !order.needs_processing() {
            reporter.info(&format!(
                "order {} needs no processing; not exporting",
                order.number
            ));
            return Ok(ExportOutcome::Skipped(SkipReason::NoProcessingNeeded));
        }

        let link = tracking_link(&settings.tracking_page_base_url, &order.number);
        let mut payload = OrderPayload {
            order_id: order.number.clone(),
            order_url: link.clone(),
            order_date: order.created_at,
            delivered_with_seven_senders: true,
            boarding_complete: true,
            language: order.language.clone(),
        };
        self.hooks.before_order_export(&order, &mut payload);

        tracing::debug!(order = %order.number, "creating remote order");
        if let Err(err) = self.api.create_order(&payload) {
            reporter.error(&format!("order {} export failed: {err}", order.number));
            self.hooks.after_order_export(&order, false);
            return Ok(ExportOutcome::Failed(FailureReason::Api(err.to_string())));
        }

        tracking.order_exported = true;
        tracking.tracking_link = Some(link);
        self.store.save_tracking(order.id, &tracking)?;

        let state = OrderStatePayload {
            order_id: order.number.clone(),
            state: STATE_IN_PREPARATION.to_string(),
            datetime: self.clock.now().with_timezone(&settings.offset),
        };
        if let Err(err) = self.api.set_order_state(&state) {
            reporter.warn(&format!(
                "order {} exported but setting state '{STATE_IN_PREPARATION}' failed: {err}",
                order.number
            ));
        }

        self.hooks.after_order_export(&order, true);
        reporter.info(&format!("order {} exported", order.number));
        Ok(ExportOutcome::Exported)
    }

    /// Export the shipment of an already exported order.
    pub fn export_shipment(
        &mut self,
        order_id: u64,
        reporter: &mut dyn Reporter,
    ) -> Result<ExportOutcome> {
        let settings = match self.required_settings(reporter) {
            Ok(settings) => settings,
            Err(reason) => return Ok(ExportOutcome::Skipped(reason)),
        };
        let Some(record) = self.load_order(order_id, reporter)? else {
            return Ok(ExportOutcome::Skipped(SkipReason::UnknownOrder(order_id)));
        };
        let order = record.order;
        let mut tracking = record.tracking;

        if tracking.shipment_exported {
            reporter.info(&format!("shipment of order {} already exported", order.number));
            return Ok(ExportOutcome::AlreadyExported);
        }
        if !tracking.order_exported {
            reporter.warn(&format!(
                "order {} must be exported before its shipment",
                order.number
            ));
            return Ok(ExportOutcome::Skipped(SkipReason::OrderNotExported));
        }
        let Some(carrier) = tracking.carrier().map(str::to_string) else {
            reporter.error(&format!("order {} has no shipping carrier", order.number));
            return Ok(ExportOutcome::Skipped(SkipReason::MissingCarrier));
        };
        let Some(tracking_code) = tracking.tracking_code().map(str::to_string) else {
            reporter.error(&format!("order {} has no tracking code", order.number));
            return Ok(ExportOutcome::Skipped(SkipReason::MissingTrackingCode));
        };

        let carriers = match self.api.carriers() {
            Ok(carriers) => carriers,
            Err(err) => {
                reporter.error(&format!("could not fetch supported carriers: {err}"));
                return Ok(ExportOutcome::Failed(FailureReason::Api(err.to_string())));
            }
        };
        let country = order.destination_country();
        if let Err(reason) = validate_carrier(&carriers, &carrier, &country) {
            reporter.error(&format!("order {}: {reason}", order.number));
            return Ok(ExportOutcome::Failed(reason));
        }

        let now = self.clock.now().with_timezone(&settings.offset);
        let shipping = &order.shipping;
        let mut payload = ShipmentPayload {
            tracking_code,
            order_id: order.number.clone(),
            carrier: CarrierRef {
                name: carrier,
                country: country.clone(),
            },
            recipient_first_name: shipping.first_name.clone(),
            recipient_last_name: shipping.last_name.clone(),
            recipient_company_name: shipping.company.clone(),
            recipient_email: order.billing_email.clone(),
            recipient_phone: shipping.phone.clone(),
            recipient_address: shipping.street(),
            recipient_zip: shipping.postcode.clone(),
            recipient_city: shipping.city.clone(),
            recipient_country: country,
            planned_pickup_datetime: planned_pickup(now),
            trackable: true,
            return_parcel: false,
        };
        self.hooks.before_shipment_export(&order, &mut payload);

        tracing::debug!(order = %order.number, carrier = %payload.carrier.name, "creating remote shipment");
        if let Err(err) = self.api.create_shipment(&payload) {
            reporter.error(&format!("shipment of order {} failed: {err}", order.number));
            self.hooks.after_shipment_export(&order, false);
            return Ok(ExportOutcome::Failed(FailureReason::Api(err.to_string())));
        }

        tracking.shipment_exported = true;
        self.store.save_tracking(order.id, &tracking)?;

        self.hooks.after_shipment_export(&order, true);
        reporter.info(&format!("shipment of order {} exported", order.number));
        Ok(ExportOutcome::Exported)
    }

    /// Record the carrier and tracking code a shipment export will use.
    pub fn record_shipping(
        &mut self,
        order_id: u64,
        carrier: &str,
        tracking_code: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        let Some(record) = self.store.get(order_id)? else {
            bail!("order {order_id} not found in {}", self.store.location());
        };
        let mut tracking = record.tracking;
        tracking.carrier = Some(carrier.trim().to_string()).filter(|c| !c.is_empty());
        tracking.tracking_code = Some(tracking_code.trim().to_string()).filter(|c| !c.is_empty());
        self.store.save_tracking(order_id, &tracking)?;

        reporter.info(&format!(
            "order {}: carrier '{}', tracking code '{}'",
            record.order.number,
            tracking.carrier().unwrap_or("-"),
            tracking.tracking_code().unwrap_or("-"),
        ));
        Ok(())
    }

    /// Apply a status transition and run the exports it triggers.
    ///
    /// `processing` exports the order; `completed` exports the order (a no-op
    /// when already done) and then its shipment. Other statuses only update
    /// the stored status.
    pub fn handle_status_change(
        &mut self,
        order_id: u64,
        status: OrderStatus,
        reporter: &mut dyn Reporter,
    ) -> Result<StatusChangeOutcome> {
        let Some(record) = self.load_order(order_id, reporter)? else {
            return Ok(StatusChangeOutcome {
                order: Some(ExportOutcome::Skipped(SkipReason::UnknownOrder(order_id))),
                shipment: None,
            });
        };

        if record.order.status != status {
            tracing::debug!(order = %record.order.number, from = %record.order.status, to = %status, "status changed");
            let order = Order {
                status,
                ..record.order
            };
            self.store.upsert_order(order)?;
        }

        let mut outcome = StatusChangeOutcome::default();
        match status {
            OrderStatus::Processing => {
                outcome.order = Some(self.export_order(order_id, reporter)?);
            }
            OrderStatus::Completed => {
                outcome.order = Some(self.export_order(order_id, reporter)?);
                outcome.shipment = Some(self.export_shipment(order_id, reporter)?);
            }
            _ => {}
        }
        Ok(outcome)
    }
}
