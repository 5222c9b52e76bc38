#![no_main]

use libfuzzer_sys::fuzz_target;
use sevensenders_store::{validate_schema_version, StoreDocument};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<StoreDocument>(data) else {
        return;
    };
    let _ = validate_schema_version(&doc.schema_version);

    let encoded = serde_json::to_string(&doc).expect("serialize");
    let decoded: StoreDocument = serde_json::from_str(&encoded).expect("reparse");
    assert_eq!(doc.orders.len(), decoded.orders.len());
    for (id, record) in &decoded.orders {
        assert_eq!(record.tracking.stage(), doc.orders[id].tracking.stage());
    }
});
