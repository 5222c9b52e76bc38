//! Order record storage.
//!
//! The export pipeline keeps each order together with its typed
//! [`TrackingMeta`] in an [`OrderStore`]. Two backends are provided: an
//! in-memory [`MemoryStore`] for tests and embedding, and a [`FileStore`]
//! that persists a single JSON document with atomic writes.
//!
//! # Example
//!
//! ```
//! use sevensenders_store::{MemoryStore, OrderStore};
//!
//! let store = MemoryStore::new();
//! assert!(store.list().expect("list").is_empty());
//! assert!(store.last_reconciled_at().expect("read").is_none());
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sevensenders_types::{Order, OrderRecord, TrackingMeta};

/// Schema version written into every store document.
pub const CURRENT_SCHEMA_VERSION: &str = "sevensenders.store.v1";

/// Oldest document version this build can read.
pub const MINIMUM_SUPPORTED_VERSION: u32 = 1;

/// Default file name of the JSON store.
pub const STORE_FILE: &str = "sevensenders-store.json";

/// Parse the numeric version out of a string like `sevensenders.store.v1`.
pub fn parse_schema_version(s: &str) -> Result<u32> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 3 || parts[0] != "sevensenders" || parts[1] != "store" {
        bail!("invalid schema version format: {s}");
    }
    let Some(number) = parts[2].strip_prefix('v') else {
        bail!("invalid schema version format: {s}");
    };
    number
        .parse::<u32>()
        .with_context(|| format!("invalid version number: {s}"))
}

/// Reject documents written by an unknown or too-old schema.
pub fn validate_schema_version(version: &str) -> Result<()> {
    let parsed = parse_schema_version(version)?;
    if parsed < MINIMUM_SUPPORTED_VERSION {
        bail!(
            "schema version {version} is too old. Minimum supported version is v{MINIMUM_SUPPORTED_VERSION}"
        );
    }
    Ok(())
}

/// Storage of orders and their tracking metadata, keyed by order id.
pub trait OrderStore {
    /// Load one record.
    fn get(&self, id: u64) -> Result<Option<OrderRecord>>;

    /// Insert an order or replace its data, keeping any tracking metadata
    /// already recorded for it.
    fn upsert_order(&mut self, order: Order) -> Result<()>;

    /// Replace the tracking metadata of an existing order.
    fn save_tracking(&mut self, id: u64, tracking: &TrackingMeta) -> Result<()>;

    /// All records, ordered by id.
    fn list(&self) -> Result<Vec<OrderRecord>>;

    /// Exported orders created in `[since, until]` without a delivery date.
    fn orders_missing_delivery(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| awaits_delivery(record, since, until))
            .collect())
    }

    fn last_reconciled_at(&self) -> Result<Option<DateTime<Utc>>>;

    fn set_last_reconciled_at(&mut self, at: DateTime<Utc>) -> Result<()>;

    /// Human-readable location, for log lines.
    fn location(&self) -> String;
}

fn awaits_delivery(record: &OrderRecord, since: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    record.tracking.order_exported
        && record.tracking.delivered_at.is_none()
        && record.order.created_at >= since
        && record.order.created_at <= until
}

/// On-disk document shared by both backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub schema_version: String,
    #[serde(default)]
    pub orders: BTreeMap<u64, OrderRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            orders: BTreeMap::new(),
            last_reconciled_at: None,
        }
    }
}

impl StoreDocument {
    fn upsert(&mut self, order: Order) {
        match self.orders.get_mut(&order.id) {
            Some(record) => record.order = order,
            None => {
                self.orders.insert(order.id, OrderRecord::new(order));
            }
        }
    }

    fn set_tracking(&mut self, id: u64, tracking: &TrackingMeta) -> Result<()> {
        let Some(record) = self.orders.get_mut(&id) else {
            bail!("order {id} not found in store");
        };
        record.tracking = tracking.clone();
        Ok(())
    }
}

/// Volatile store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    doc: StoreDocument,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let mut store = Self::new();
        for order in orders {
            store.doc.upsert(order);
        }
        store
    }
}

impl OrderStore for MemoryStore {
    fn get(&self, id: u64) -> Result<Option<OrderRecord>> {
        Ok(self.doc.orders.get(&id).cloned())
    }

    fn upsert_order(&mut self, order: Order) -> Result<()> {
        self.doc.upsert(order);
        Ok(())
    }

    fn save_tracking(&mut self, id: u64, tracking: &TrackingMeta) -> Result<()> {
        self.doc.set_tracking(id, tracking)
    }

    fn list(&self) -> Result<Vec<OrderRecord>> {
        Ok(self.doc.orders.values().cloned().collect())
    }

    fn last_reconciled_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.doc.last_reconciled_at)
    }

    fn set_last_reconciled_at(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.doc.last_reconciled_at = Some(at);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// JSON-file store.
///
/// The document is loaded once by [`FileStore::open`] and rewritten
/// atomically after every mutation.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    doc: StoreDocument,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read store file {}", path.display()))?;
            let doc: StoreDocument = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse store JSON {}", path.display()))?;
            validate_schema_version(&doc.schema_version)
                .with_context(|| format!("unsupported store file {}", path.display()))?;
            doc
        } else {
            StoreDocument::default()
        };
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store dir {}", parent.display()))?;
        }
        atomic_write_json(&self.path, &self.doc)
    }
}

impl OrderStore for FileStore {
    fn get(&self, id: u64) -> Result<Option<OrderRecord>> {
        Ok(self.doc.orders.get(&id).cloned())
    }

    fn upsert_order(&mut self, order: Order) -> Result<()> {
        self.doc.upsert(order);
        self.persist()
    }

    fn save_tracking(&mut self, id: u64, tracking: &TrackingMeta) -> Result<()> {
        self.doc.set_tracking(id, tracking)?;
        self.persist()
    }

    fn list(&self) -> Result<Vec<OrderRecord>> {
        Ok(self.doc.orders.values().cloned().collect())
    }

    fn last_reconciled_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.doc.last_reconciled_at)
    }

    fn set_last_reconciled_at(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.doc.last_reconciled_at = Some(at);
        self.persist()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value).context("failed to serialize store JSON")?;

    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to rename tmp file {} to {}",
            tmp.display(),
            path.display()
        )
    })?;

    fsync_parent_dir(path);
    Ok(())
}
