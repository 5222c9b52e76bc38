//! Core domain types for Seven Senders order tracking.
//!
//! This crate provides the types shared across the workspace: local orders
//! and their typed tracking metadata, plus the payloads exchanged with the
//! Seven Senders REST API.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Order state pushed to the API right after an order has been exported.
pub const STATE_IN_PREPARATION: &str = "in_preparation";

/// Default remote state that marks an order as delivered.
pub const STATE_DELIVERED: &str = "delivered";

/// Lifecycle status of a local shop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_start_matches("wc-") {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "on-hold" | "on_hold" => Ok(OrderStatus::OnHold),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Shipping address of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub address_1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_2: Option<String>,
    pub postcode: String,
    pub city: String,
    /// ISO 3166-1 alpha-2 country code as entered in the shop (any case).
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Address {
    /// Street line, joining the optional second line when present.
    pub fn street(&self) -> String {
        match self.address_2.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{} {}", self.address_1.trim(), extra),
            _ => self.address_1.trim().to_string(),
        }
    }
}

/// A line item of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_downloadable: bool,
}

fn default_quantity() -> u32 {
    1
}

/// A local shop order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Internal order identifier (the store key).
    pub id: u64,
    /// Customer-facing order number, used as the remote `order_id`.
    pub number: String,
    #[serde(default)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_email: Option<String>,
    pub shipping: Address,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Whether the order contains something that has to be physically
    /// processed, i.e. at least one item that is not both virtual and
    /// downloadable.
    pub fn needs_processing(&self) -> bool {
        self.items
            .iter()
            .any(|item| !(item.is_virtual && item.is_downloadable))
    }

    /// Destination country, uppercased.
    pub fn destination_country(&self) -> String {
        self.shipping.country.trim().to_uppercase()
    }
}

/// Export progress of an order, derived from its [`TrackingMeta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    NotExported,
    OrderExported,
    ShipmentExported,
    Delivered,
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportStage::NotExported => write!(f, "not exported"),
            ExportStage::OrderExported => write!(f, "order exported"),
            ExportStage::ShipmentExported => write!(f, "shipment exported"),
            ExportStage::Delivered => write!(f, "delivered"),
        }
    }
}

/// Per-order tracking metadata.
///
/// Every field is optional on disk so records written by older versions keep
/// loading; an absent flag means "not done yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingMeta {
    #[serde(default)]
    pub order_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub shipment_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<FixedOffset>>,
}

impl TrackingMeta {
    pub fn stage(&self) -> ExportStage {
        if self.delivered_at.is_some() {
            ExportStage::Delivered
        } else if self.shipment_exported {
            ExportStage::ShipmentExported
        } else if self.order_exported {
            ExportStage::OrderExported
        } else {
            ExportStage::NotExported
        }
    }

    /// Carrier with surrounding whitespace removed, if non-empty.
    pub fn carrier(&self) -> Option<&str> {
        non_empty(self.carrier.as_deref())
    }

    /// Tracking code with surrounding whitespace removed, if non-empty.
    pub fn tracking_code(&self) -> Option<&str> {
        non_empty(self.tracking_code.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// An order together with its tracking metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order: Order,
    #[serde(default)]
    pub tracking: TrackingMeta,
}

impl OrderRecord {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            tracking: TrackingMeta::default(),
        }
    }
}

/// Body of `POST orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order_id: String,
    pub order_url: String,
    pub order_date: DateTime<Utc>,
    pub delivered_with_seven_senders: bool,
    pub boarding_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Body of `POST order_states`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatePayload {
    pub order_id: String,
    pub state: String,
    pub datetime: DateTime<FixedOffset>,
}

/// Carrier reference embedded in a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierRef {
    pub name: String,
    pub country: String,
}

/// Body of `POST shipments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentPayload {
    pub tracking_code: String,
    pub order_id: String,
    pub carrier: CarrierRef,
    pub recipient_first_name: String,
    pub recipient_last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_phone: Option<String>,
    pub recipient_address: String,
    pub recipient_zip: String,
    pub recipient_city: String,
    pub recipient_country: String,
    pub planned_pickup_datetime: DateTime<FixedOffset>,
    pub trackable: bool,
    pub return_parcel: bool,
}

/// A carrier supported by the API, scoped to destination countries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub countries: Vec<String>,
}

impl Carrier {
    /// Whether the carrier ships to `country` (expected uppercased).
    pub fn serves(&self, country: &str) -> bool {
        self.countries.iter().any(|c| c == country)
    }
}

/// One entry of a remote order's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub state: String,
    pub datetime: DateTime<FixedOffset>,
}

/// An order as returned by `GET orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub order_id: String,
    #[serde(default)]
    pub state_history: Vec<StateHistoryEntry>,
}

impl RemoteOrder {
    /// Timestamp of the first history entry in `state`.
    pub fn first_entered(&self, state: &str) -> Option<DateTime<FixedOffset>> {
        self.state_history
            .iter()
            .find(|entry| entry.state == state)
            .map(|entry| entry.datetime)
    }
}

/// Date window for `GET orders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderQuery {
    pub created_after: DateTime<Utc>,
    pub created_before: DateTime<Utc>,
}
