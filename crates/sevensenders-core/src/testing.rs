//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use sevensenders_api::{ApiError, SevenSendersApi};
use sevensenders_config::Config;
use sevensenders_types::{
    Address, Carrier, Order, OrderItem, OrderPayload, OrderQuery, OrderStatePayload, OrderStatus,
    RemoteOrder, ShipmentPayload,
};

use crate::reporter::Reporter;

#[derive(Default)]
pub(crate) struct CollectingReporter {
    pub infos: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn info(&mut self, msg: &str) {
        self.infos.push(msg.to_string());
    }

    fn warn(&mut self, msg: &str) {
        self.warns.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }
}

/// Scripted API. Unscripted calls succeed with `{}`.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub create_order_results: VecDeque<Result<Value, ApiError>>,
    pub order_state_results: VecDeque<Result<Value, ApiError>>,
    pub shipment_results: VecDeque<Result<Value, ApiError>>,
    pub carriers: Vec<Carrier>,
    pub carriers_fail: bool,
    pub remote_orders: Vec<RemoteOrder>,
    pub list_fails: bool,

    pub calls: Vec<&'static str>,
    pub orders_sent: Vec<OrderPayload>,
    pub states_sent: Vec<OrderStatePayload>,
    pub shipments_sent: Vec<ShipmentPayload>,
    pub queries: Vec<OrderQuery>,
}

impl FakeApi {
    pub fn with_carriers(carriers: Vec<Carrier>) -> Self {
        Self {
            carriers,
            ..Default::default()
        }
    }
}

pub(crate) fn unauthorized() -> ApiError {
    ApiError::ReauthExhausted { attempts: 5 }
}

impl SevenSendersApi for FakeApi {
    fn create_order(&mut self, payload: &OrderPayload) -> Result<Value, ApiError> {
        self.calls.push("create_order");
        self.orders_sent.push(payload.clone());
        self.create_order_results
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    fn set_order_state(&mut self, payload: &OrderStatePayload) -> Result<Value, ApiError> {
        self.calls.push("set_order_state");
        self.states_sent.push(payload.clone());
        self.order_state_results
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    fn create_shipment(&mut self, payload: &ShipmentPayload) -> Result<Value, ApiError> {
        self.calls.push("create_shipment");
        self.shipments_sent.push(payload.clone());
        self.shipment_results
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    fn list_orders(&mut self, query: &OrderQuery) -> Result<Vec<RemoteOrder>, ApiError> {
        self.calls.push("list_orders");
        self.queries.push(*query);
        if self.list_fails {
            return Err(unauthorized());
        }
        Ok(self.remote_orders.clone())
    }

    fn carriers(&mut self) -> Result<Vec<Carrier>, ApiError> {
        self.calls.push("carriers");
        if self.carriers_fail {
            return Err(unauthorized());
        }
        Ok(self.carriers.clone())
    }
}

pub(crate) fn dhl() -> Carrier {
    Carrier {
        code: "dhl".to_string(),
        name: "DHL".to_string(),
        countries: vec!["DE".to_string(), "AT".to_string()],
    }
}

pub(crate) fn config() -> Config {
    config_with("")
}

/// Complete settings plus `extra` TOML appended at the end.
pub(crate) fn config_with(extra: &str) -> Config {
    let base = r#"
[api]
base_url = "https://api.example.com/v2"
access_key = "key"

[tracking]
page_base_url = "https://track.example.com/"

[shop]
utc_offset = "+01:00"
"#;
    Config::from_toml_str(&format!("{base}\n{extra}")).expect("config")
}

/// Physical order 1042, created Wednesday 2024-03-06 10:00 UTC, shipping to Germany.
pub(crate) fn sample_order() -> Order {
    Order {
        id: 42,
        number: "1042".to_string(),
        status: OrderStatus::Processing,
        created_at: Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap(),
        language: Some("de".to_string()),
        billing_email: Some("erika@example.com".to_string()),
        shipping: Address {
            first_name: "Erika".to_string(),
            last_name: "Mustermann".to_string(),
            company: None,
            address_1: "Hauptstr. 1".to_string(),
            address_2: None,
            postcode: "10115".to_string(),
            city: "Berlin".to_string(),
            country: "de".to_string(),
            phone: Some("+49 30 123".to_string()),
        },
        items: vec![OrderItem {
            name: "Mug".to_string(),
            quantity: 2,
            is_virtual: false,
            is_downloadable: false,
        }],
    }
}
