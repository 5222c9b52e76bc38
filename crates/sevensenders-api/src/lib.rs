//! Seven Senders REST API client.
//!
//! The client speaks JSON over HTTPS, authenticates by trading the shop's
//! access key for a bearer token, and transparently re-authenticates when a
//! request is rejected with `401 Unauthorized`. Re-authentications draw from
//! a budget owned by the client (see [`sevensenders_retry::AttemptBudget`]),
//! so a revoked key fails fast instead of looping.
//!
//! # Example
//!
//! ```no_run
//! use sevensenders_api::{ApiClient, SevenSendersApi};
//!
//! let mut client = ApiClient::new("https://api.sevensenders.com/v2", "access-key");
//! let carriers = client.carriers()?;
//! println!("{} carriers supported", carriers.len());
//! # Ok::<(), sevensenders_api::ApiError>(())
//! ```

use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use sevensenders_retry::{AttemptBudget, ReauthPolicy, calculate_delay};
use sevensenders_types::{
    Carrier, OrderPayload, OrderQuery, OrderStatePayload, RemoteOrder, ShipmentPayload,
};

/// Default timeout for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default lifetime of the cached carrier list
pub const DEFAULT_CARRIER_TTL_SECS: u64 = 3600;

/// Default user agent for API requests
pub const USER_AGENT: &str = concat!("sevensenders-sync/", env!("CARGO_PKG_VERSION"));

pub const TOKEN_ENDPOINT: &str = "token";
pub const ORDERS_ENDPOINT: &str = "orders";
pub const ORDER_STATES_ENDPOINT: &str = "order_states";
pub const SHIPMENTS_ENDPOINT: &str = "shipments";
pub const CARRIERS_ENDPOINT: &str = "carriers";

/// Errors returned by the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request URL for endpoint '{endpoint}': {source}")]
    InvalidUrl {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned status {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("{method} {url} returned a body that is not valid JSON: {source}")]
    Body {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response shape from '{endpoint}': {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("response from '{endpoint}' is missing field '{field}'")]
    MissingField {
        endpoint: &'static str,
        field: &'static str,
    },

    #[error("still unauthorized after {attempts} re-authentication attempts")]
    ReauthExhausted { attempts: u32 },
}

impl ApiError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::ReauthExhausted { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}

/// High-level Seven Senders operations used by the export pipeline.
pub trait SevenSendersApi {
    /// `POST orders`
    fn create_order(&mut self, payload: &OrderPayload) -> Result<Value, ApiError>;

    /// `POST order_states`
    fn set_order_state(&mut self, payload: &OrderStatePayload) -> Result<Value, ApiError>;

    /// `POST shipments`
    fn create_shipment(&mut self, payload: &ShipmentPayload) -> Result<Value, ApiError>;

    /// `GET orders` within a creation-date window.
    fn list_orders(&mut self, query: &OrderQuery) -> Result<Vec<RemoteOrder>, ApiError>;

    /// `GET carriers`, possibly served from a cache.
    fn carriers(&mut self) -> Result<Vec<Carrier>, ApiError>;
}

impl<T: SevenSendersApi + ?Sized> SevenSendersApi for &mut T {
    fn create_order(&mut self, payload: &OrderPayload) -> Result<Value, ApiError> {
        (**self).create_order(payload)
    }

    fn set_order_state(&mut self, payload: &OrderStatePayload) -> Result<Value, ApiError> {
        (**self).set_order_state(payload)
    }

    fn create_shipment(&mut self, payload: &ShipmentPayload) -> Result<Value, ApiError> {
        (**self).create_shipment(payload)
    }

    fn list_orders(&mut self, query: &OrderQuery) -> Result<Vec<RemoteOrder>, ApiError> {
        (**self).list_orders(query)
    }

    fn carriers(&mut self) -> Result<Vec<Carrier>, ApiError> {
        (**self).carriers()
    }
}

#[derive(Debug, Clone)]
struct CachedCarriers {
    fetched_at: Instant,
    carriers: Vec<Carrier>,
}

/// Seven Senders API client.
///
/// The bearer token, the carrier cache and the re-authentication budget all
/// belong to the instance; two clients never share them.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    access_key: String,
    timeout: Duration,
    client: Client,
    token: Option<String>,
    reauth: ReauthPolicy,
    budget: AttemptBudget,
    carrier_ttl: Duration,
    carrier_cache: Option<CachedCarriers>,
}

impl ApiClient {
    /// Create a new client for the given base URL and access key
    pub fn new(base_url: &str, access_key: &str) -> Self {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let reauth = ReauthPolicy::default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
            timeout,
            client: build_http_client(timeout),
            token: None,
            budget: AttemptBudget::new(reauth.max_attempts),
            reauth,
            carrier_ttl: Duration::from_secs(DEFAULT_CARRIER_TTL_SECS),
            carrier_cache: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_http_client(timeout);
        self
    }

    /// Replace the re-authentication policy; this also refills the budget.
    pub fn with_reauth_policy(mut self, policy: ReauthPolicy) -> Self {
        self.budget = AttemptBudget::new(policy.max_attempts);
        self.reauth = policy;
        self
    }

    /// Set how long the carrier list is cached
    pub fn with_carrier_ttl(mut self, ttl: Duration) -> Self {
        self.carrier_ttl = ttl;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Re-authentications performed since the budget was last refilled.
    pub fn reauth_attempts(&self) -> u32 {
        self.budget.used()
    }

    /// Drop the cached carrier list so the next lookup hits the API.
    pub fn invalidate_carriers(&mut self) {
        self.carrier_cache = None;
    }

    /// Trade the access key for a bearer token and keep it for later requests.
    pub fn authenticate(&mut self) -> Result<(), ApiError> {
        tracing::debug!(base_url = %self.base_url, "authenticating");
        let body = json!({ "access_key": self.access_key });
        let response = self.request(Method::POST, TOKEN_ENDPOINT, Some(&body), &[], false)?;

        let token = response
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::MissingField {
                endpoint: TOKEN_ENDPOINT,
                field: "token",
            })?;

        self.token = Some(token.to_string());
        Ok(())
    }

    /// Send a JSON request to `endpoint` and parse the JSON response.
    ///
    /// With `authenticate` set, a token is fetched first if none is cached,
    /// and a `401` answer triggers re-authentication and a replay of the same
    /// request for as long as the re-authentication budget lasts. Any status
    /// outside `200..=299` is an error, as is a body that is not JSON.
    pub fn request(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        params: &[(&str, String)],
        authenticate: bool,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint_url(endpoint, params)?;

        if authenticate && self.token.is_none() {
            self.authenticate()?;
        }

        loop {
            let response = self.send(&method, &url, body, authenticate)?;
            let status = response.status();

            if authenticate && status == StatusCode::UNAUTHORIZED {
                let Some(attempt) = self.budget.try_consume() else {
                    tracing::error!(
                        %method,
                        %url,
                        attempts = self.budget.used(),
                        "re-authentication budget exhausted"
                    );
                    return Err(ApiError::ReauthExhausted {
                        attempts: self.budget.used(),
                    });
                };

                tracing::warn!(%method, %url, attempt, "unauthorized; re-authenticating");
                let delay = calculate_delay(&self.reauth, attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                self.token = None;
                self.authenticate()?;
                continue;
            }

            let text = response.text().map_err(|source| ApiError::Transport {
                method: method.clone(),
                url: url.to_string(),
                source,
            })?;

            if !status.is_success() {
                tracing::debug!(%method, %url, %status, "request failed");
                return Err(ApiError::Status {
                    method,
                    url: url.to_string(),
                    status,
                    body: text,
                });
            }

            if authenticate && self.reauth.reset_on_success {
                self.budget.reset();
            }

            return serde_json::from_str(&text).map_err(|source| ApiError::Body {
                method,
                url: url.to_string(),
                source,
            });
        }
    }

    fn send(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        authenticate: bool,
    ) -> Result<Response, ApiError> {
        tracing::debug!(%method, %url, "sending request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        if authenticate && let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request.send().map_err(|source| ApiError::Transport {
            method: method.clone(),
            url: url.to_string(),
            source,
        })
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, ApiError> {
        let raw = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|source| ApiError::InvalidUrl {
            endpoint: endpoint.to_string(),
            source,
        })?;

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn post<T: serde::Serialize>(&mut self, endpoint: &str, payload: &T) -> Result<Value, ApiError> {
        let body = serde_json::to_value(payload).map_err(ApiError::Encode)?;
        self.request(Method::POST, endpoint, Some(&body), &[], true)
    }
}

impl SevenSendersApi for ApiClient {
    fn create_order(&mut self, payload: &OrderPayload) -> Result<Value, ApiError> {
        self.post(ORDERS_ENDPOINT, payload)
    }

    fn set_order_state(&mut self, payload: &OrderStatePayload) -> Result<Value, ApiError> {
        self.post(ORDER_STATES_ENDPOINT, payload)
    }

    fn create_shipment(&mut self, payload: &ShipmentPayload) -> Result<Value, ApiError> {
        self.post(SHIPMENTS_ENDPOINT, payload)
    }

    fn list_orders(&mut self, query: &OrderQuery) -> Result<Vec<RemoteOrder>, ApiError> {
        let params = [
            ("order_date[after]", query.created_after.to_rfc3339()),
            ("order_date[before]", query.created_before.to_rfc3339()),
        ];
        let value = self.request(Method::GET, ORDERS_ENDPOINT, None, &params, true)?;
        decode(ORDERS_ENDPOINT, value)
    }

    fn carriers(&mut self) -> Result<Vec<Carrier>, ApiError> {
        if let Some(cache) = &self.carrier_cache
            && cache.fetched_at.elapsed() < self.carrier_ttl
        {
            tracing::debug!(count = cache.carriers.len(), "serving carriers from cache");
            return Ok(cache.carriers.clone());
        }

        let value = self.request(Method::GET, CARRIERS_ENDPOINT, None, &[], true)?;
        let carriers: Vec<Carrier> = decode(CARRIERS_ENDPOINT, value)?;

        self.carrier_cache = Some(CachedCarriers {
            fetched_at: Instant::now(),
            carriers: carriers.clone(),
        });
        Ok(carriers)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &'static str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode { endpoint, source })
}

fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use chrono::{TimeZone, Utc};
    use tiny_http::{Header, Response, Server, StatusCode as HttpStatus};

    use super::*;

    #[derive(Debug, Clone)]
    struct SeenRequest {
        method: String,
        url: String,
        auth: Option<String>,
        body: String,
    }

    struct TestApiServer {
        base_url: String,
        seen: Arc<Mutex<Vec<SeenRequest>>>,
        handle: thread::JoinHandle<()>,
    }

    impl TestApiServer {
        fn finish(self) -> Vec<SeenRequest> {
            self.handle.join().expect("join server");
            let seen = self.seen.lock().expect("lock");
            seen.clone()
        }
    }

    /// Answer requests with `script` in order, whatever their path.
    fn spawn_api_server(script: Vec<(u16, &'static str)>) -> TestApiServer {
        let server = Server::http("127.0.0.1:0").expect("server");
        let base_url = format!("http://{}/v2", server.server_addr());
        let seen = Arc::new(Mutex::new(Vec::<SeenRequest>::new()));
        let seen_thread = Arc::clone(&seen);

        let handle = thread::spawn(move || {
            for (status, body) in script {
                let Ok(Some(mut req)) = server.recv_timeout(Duration::from_secs(5)) else {
                    return;
                };
                let mut request_body = String::new();
                req.as_reader()
                    .read_to_string(&mut request_body)
                    .expect("read body");
                let auth = req
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                seen_thread.lock().expect("lock").push(SeenRequest {
                    method: req.method().to_string(),
                    url: req.url().to_string(),
                    auth,
                    body: request_body,
                });

                let resp = Response::from_string(body)
                    .with_status_code(HttpStatus(status))
                    .with_header(
                        Header::from_bytes("Content-Type", "application/json").expect("header"),
                    );
                req.respond(resp).expect("respond");
            }
        });

        TestApiServer {
            base_url,
            seen,
            handle,
        }
    }

    fn order_payload() -> OrderPayload {
        OrderPayload {
            order_id: "1001".to_string(),
            order_url: "https://track.example.com/1001".to_string(),
            order_date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            delivered_with_seven_senders: true,
            boarding_complete: true,
            language: Some("de".to_string()),
        }
    }

    fn paths(seen: &[SeenRequest]) -> Vec<&str> {
        seen.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = ApiClient::new("https://api.example.com/v2/", "key");
        assert_eq!(client.base_url(), "https://api.example.com/v2");
        assert!(!client.is_authenticated());
    }

    #[test]
    fn client_with_timeout() {
        let client = ApiClient::new("https://api.example.com", "key")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn endpoint_url_encodes_params() {
        let client = ApiClient::new("https://api.example.com/v2/", "key");
        let url = client
            .endpoint_url("/orders", &[("order_date[after]", "2024-03-01T00:00:00+00:00".to_string())])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/orders?order_date%5Bafter%5D=2024-03-01T00%3A00%3A00%2B00%3A00"
        );
    }

    #[test]
    fn authenticate_posts_access_key_and_caches_token() {
        let server = spawn_api_server(vec![(200, r#"{"token":"t1"}"#)]);
        let mut client = ApiClient::new(&server.base_url, "secret-key");

        client.authenticate().expect("authenticate");
        assert!(client.is_authenticated());

        let seen = server.finish();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].url, "/v2/token");
        assert_eq!(seen[0].auth, None);
        let body: Value = serde_json::from_str(&seen[0].body).expect("json body");
        assert_eq!(body, json!({"access_key": "secret-key"}));
    }

    #[test]
    fn token_response_without_token_is_an_error() {
        let server = spawn_api_server(vec![(200, r#"{"access":"nope"}"#)]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let err = client.authenticate().expect_err("missing token");
        assert!(matches!(
            err,
            ApiError::MissingField {
                endpoint: TOKEN_ENDPOINT,
                field: "token"
            }
        ));
        assert!(!client.is_authenticated());
        server.finish();
    }

    #[test]
    fn rejected_access_key_is_a_status_error_without_replay() {
        let server = spawn_api_server(vec![(401, r#"{"message":"bad key"}"#)]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let err = client.create_order(&order_payload()).expect_err("token rejected");
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(matches!(err, ApiError::Status { .. }));
        assert_eq!(client.reauth_attempts(), 0);

        let seen = server.finish();
        assert_eq!(paths(&seen), vec!["/v2/token"]);
    }

    #[test]
    fn create_order_authenticates_first_and_sends_bearer_token() {
        let server = spawn_api_server(vec![
            (200, r#"{"token":"t1"}"#),
            (201, r#"{"id":"remote-1"}"#),
        ]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let created = client.create_order(&order_payload()).expect("create order");
        assert_eq!(created["id"], "remote-1");

        let seen = server.finish();
        assert_eq!(paths(&seen), vec!["/v2/token", "/v2/orders"]);
        assert_eq!(seen[1].auth.as_deref(), Some("Bearer t1"));
        let body: Value = serde_json::from_str(&seen[1].body).expect("json body");
        assert_eq!(body["order_id"], "1001");
        assert_eq!(body["order_url"], "https://track.example.com/1001");
        assert_eq!(body["language"], "de");
    }

    #[test]
    fn unauthorized_triggers_one_reauth_and_replay() {
        let server = spawn_api_server(vec![
            (200, r#"{"token":"t1"}"#),
            (401, r#"{"message":"expired"}"#),
            (200, r#"{"token":"t2"}"#),
            (201, r#"{"id":"remote-1"}"#),
        ]);
        let mut client = ApiClient::new(&server.base_url, "key")
            .with_reauth_policy(ReauthPolicy {
                reset_on_success: false,
                ..Default::default()
            });

        client.create_order(&order_payload()).expect("create order");
        assert_eq!(client.reauth_attempts(), 1);

        let seen = server.finish();
        assert_eq!(
            paths(&seen),
            vec!["/v2/token", "/v2/orders", "/v2/token", "/v2/orders"]
        );
        assert_eq!(seen[1].auth.as_deref(), Some("Bearer t1"));
        assert_eq!(seen[3].auth.as_deref(), Some("Bearer t2"));
        assert_eq!(seen[1].body, seen[3].body);
    }

    #[test]
    fn persistent_unauthorized_halts_after_five_reauths() {
        let mut script = vec![(200, r#"{"token":"t"}"#)];
        for _ in 0..5 {
            script.push((401, "{}"));
            script.push((200, r#"{"token":"t"}"#));
        }
        script.push((401, "{}"));
        let server = spawn_api_server(script);
        let mut client = ApiClient::new(&server.base_url, "key");

        let err = client.create_order(&order_payload()).expect_err("unauthorized");
        assert!(matches!(err, ApiError::ReauthExhausted { attempts: 5 }));
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

        let seen = server.finish();
        assert_eq!(seen.len(), 12);
        assert_eq!(seen.iter().filter(|r| r.url == "/v2/token").count(), 6);
        assert_eq!(seen.iter().filter(|r| r.url == "/v2/orders").count(), 6);
    }

    #[test]
    fn budget_is_cumulative_across_calls_when_not_reset() {
        let server = spawn_api_server(vec![
            (200, r#"{"token":"t1"}"#),
            (401, "{}"),
            (200, r#"{"token":"t2"}"#),
            (201, "{}"),
            (401, "{}"),
            (200, r#"{"token":"t3"}"#),
            (401, "{}"),
        ]);
        let mut client = ApiClient::new(&server.base_url, "key").with_reauth_policy(ReauthPolicy {
            max_attempts: 2,
            reset_on_success: false,
            ..Default::default()
        });

        client.create_order(&order_payload()).expect("first call");
        assert_eq!(client.reauth_attempts(), 1);

        let err = client.create_order(&order_payload()).expect_err("second call");
        assert!(matches!(err, ApiError::ReauthExhausted { attempts: 2 }));
        assert_eq!(server.finish().len(), 7);
    }

    #[test]
    fn budget_refills_after_success_by_default() {
        let server = spawn_api_server(vec![
            (200, r#"{"token":"t1"}"#),
            (401, "{}"),
            (200, r#"{"token":"t2"}"#),
            (201, "{}"),
            (401, "{}"),
            (200, r#"{"token":"t3"}"#),
            (201, "{}"),
        ]);
        let mut client = ApiClient::new(&server.base_url, "key").with_reauth_policy(ReauthPolicy {
            max_attempts: 1,
            ..Default::default()
        });

        client.create_order(&order_payload()).expect("first call");
        assert_eq!(client.reauth_attempts(), 0);
        client.create_order(&order_payload()).expect("second call");
        assert_eq!(server.finish().len(), 7);
    }

    #[test]
    fn create_order_fails_on_non_2xx() {
        for status in [302_u16, 400, 404, 422, 500] {
            let server = spawn_api_server(vec![(200, r#"{"token":"t"}"#), (status, "{}")]);
            let mut client = ApiClient::new(&server.base_url, "key");

            let err = client.create_order(&order_payload()).expect_err("non-2xx");
            assert_eq!(err.status().map(|s| s.as_u16()), Some(status));
            server.finish();
        }
    }

    #[test]
    fn create_order_requires_parsable_body() {
        let server = spawn_api_server(vec![(200, r#"{"token":"t"}"#), (201, "")]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let err = client.create_order(&order_payload()).expect_err("empty body");
        assert!(matches!(err, ApiError::Body { .. }));
        server.finish();
    }

    #[test]
    fn carriers_are_cached_until_ttl_expires() {
        let carriers = r#"[{"code":"dhl","name":"DHL","countries":["DE","AT"]}]"#;
        let server = spawn_api_server(vec![(200, r#"{"token":"t"}"#), (200, carriers)]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let first = client.carriers().expect("carriers");
        let second = client.carriers().expect("cached carriers");
        assert_eq!(first, second);
        assert_eq!(first[0].code, "dhl");
        assert_eq!(first[0].countries, vec!["DE", "AT"]);
        assert_eq!(paths(&server.finish()), vec!["/v2/token", "/v2/carriers"]);
    }

    #[test]
    fn zero_ttl_refetches_carriers() {
        let carriers = r#"[{"code":"dpd","countries":["FR"]}]"#;
        let server = spawn_api_server(vec![
            (200, r#"{"token":"t"}"#),
            (200, carriers),
            (200, carriers),
        ]);
        let mut client =
            ApiClient::new(&server.base_url, "key").with_carrier_ttl(Duration::ZERO);

        client.carriers().expect("carriers");
        client.carriers().expect("carriers again");
        assert_eq!(server.finish().len(), 3);
    }

    #[test]
    fn carriers_with_wrong_shape_fail_to_decode() {
        let server = spawn_api_server(vec![(200, r#"{"token":"t"}"#), (200, r#"{"dhl":{}}"#)]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let err = client.carriers().expect_err("object instead of list");
        assert!(matches!(
            err,
            ApiError::Decode {
                endpoint: CARRIERS_ENDPOINT,
                ..
            }
        ));
        server.finish();
    }

    #[test]
    fn list_orders_sends_date_window() {
        let body = r#"[
            {"order_id":"1001","state_history":[{"state":"delivered","datetime":"2024-03-05T14:12:00+01:00"}]},
            {"order_id":"1002"}
        ]"#;
        let server = spawn_api_server(vec![(200, r#"{"token":"t"}"#), (200, body)]);
        let mut client = ApiClient::new(&server.base_url, "key");

        let query = OrderQuery {
            created_after: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            created_before: Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
        };
        let orders = client.list_orders(&query).expect("orders");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].state_history.len(), 1);
        assert!(orders[1].state_history.is_empty());

        let seen = server.finish();
        assert_eq!(seen[1].method, "GET");
        assert!(seen[1].url.starts_with("/v2/orders?"));
        assert!(seen[1].url.contains("order_date%5Bafter%5D=2024-02-01T00%3A00%3A00%2B00%3A00"));
        assert!(seen[1].url.contains("order_date%5Bbefore%5D=2024-03-02T00%3A00%3A00%2B00%3A00"));
    }

    #[test]
    fn transport_failure_is_reported() {
        let server = Server::http("127.0.0.1:0").expect("server");
        let base_url = format!("http://{}", server.server_addr());
        drop(server);

        let mut client = ApiClient::new(&base_url, "key").with_timeout(Duration::from_secs(2));
        let err = client.authenticate().expect_err("nothing listening");
        assert!(matches!(err, ApiError::Transport { .. }));
        assert!(err.status().is_none());
    }

    #[test]
    fn user_agent_includes_version() {
        assert!(USER_AGENT.starts_with("sevensenders-sync/"));
        assert!(USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
