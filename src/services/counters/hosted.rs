use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::services::counters::{
    now_unix_ms, window_slot, CounterError, CounterSnapshot, CounterStore,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Counter backed by an Upstash-style Redis REST endpoint. The window slot is
/// embedded in the key, so rollover needs no server-side coordination; expiry
/// just garbage-collects finished windows.
pub struct HostedCounterStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HostedCounterStore {
    pub fn new(url: String, token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, url, token }
    }

    fn slot_key(key: &str, slot: i64) -> String {
        format!("{key}:{slot}")
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, CounterError> {
        let response = self
            .client
            .post(format!("{}{path}", self.url.trim_end_matches('/')))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CounterError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| CounterError::Decode(e.to_string()))
    }
}

/// Redis REST results come back as numbers, numeric strings, or null for a
/// missing key.
fn parse_count(result: &Value) -> Result<u64, CounterError> {
    match result {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| CounterError::Decode(format!("negative count: {n}"))),
        Value::String(s) => s
            .parse()
            .map_err(|_| CounterError::Decode(format!("non-numeric count: {s}"))),
        other => Err(CounterError::Decode(format!("unexpected result: {other}"))),
    }
}

#[async_trait]
impl CounterStore for HostedCounterStore {
    async fn consume(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<CounterSnapshot, CounterError> {
        let (slot, reset_at_ms) = window_slot(now_unix_ms(), window);
        let slot_key = Self::slot_key(key, slot);
        let window_ms = window.as_millis() as u64;

        // INCR and a keep-if-set expiry in one round trip. NX leaves the
        // original deadline alone when later increments race.
        let body = json!([
            ["INCR", slot_key],
            ["PEXPIRE", slot_key, window_ms.to_string(), "NX"],
        ]);
        let results = self.post("/pipeline", body).await?;

        let used = results
            .as_array()
            .and_then(|r| r.first())
            .map(|entry| parse_count(&entry["result"]))
            .transpose()?
            .ok_or_else(|| CounterError::Decode("empty pipeline response".into()))?;

        Ok(CounterSnapshot {
            allowed: used <= limit,
            used,
            remaining: limit.saturating_sub(used),
            limit,
            reset_at_ms,
        })
    }

    async fn peek(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<CounterSnapshot, CounterError> {
        let (slot, reset_at_ms) = window_slot(now_unix_ms(), window);
        let slot_key = Self::slot_key(key, slot);

        let result = self.post("", json!(["GET", slot_key])).await?;
        let used = parse_count(&result["result"])?;

        Ok(CounterSnapshot {
            allowed: used < limit,
            used,
            remaining: limit.saturating_sub(used),
            limit,
            reset_at_ms,
        })
    }
}
