#![allow(dead_code)]

use flushguard::config::Config;
use flushguard::events::Purchase;

pub const WRITE_KEY: &str = "wk_test";
/// `wk_test:` in base64
pub const BASIC_AUTH: &str = "Basic d2tfdGVzdDo=";

pub fn config(endpoint: String) -> Config {
    Config {
        write_key: WRITE_KEY.to_string(),
        endpoint,
        timeout: 5,
        flush_max_attempts: 2,
        flush_initial_backoff_ms: 10,
        flush_attempt_timeout: 2,
        // Plain bodies so mocks can match on content
        use_compression: false,
        ..Config::default()
    }
}

pub fn purchase(order_id: &str) -> Purchase {
    serde_json::from_value(serde_json::json!({
        "order_id": order_id,
        "user_id": "u-1",
        "email": "jane@example.com",
        "name": "Jane",
        "total": 42.5,
        "currency": "EUR",
        "products": [
            { "product_id": "p-1", "sku": "MUG-1", "name": "Mug", "price": 12.5, "quantity": 2 },
            { "product_id": "p-2", "name": "Tea", "price": 17.5 }
        ]
    }))
    .expect("valid purchase")
}
