use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::data_structs::subscription_duration::SubscriptionDuration;

/// Body of the direct subscription and order creation calls: `{"duration": "6"}`.
#[derive(Debug, Default)]
#[derive(Deserialize)]
pub struct DurationRequest {
    #[serde(default, deserialize_with = "selector_from_json")]
    pub duration: Option<String>,
}

impl DurationRequest {
    pub fn duration(&self) -> Option<SubscriptionDuration> {
        self.duration.as_deref().and_then(SubscriptionDuration::from_selector)
    }
}

/// Checkout forms send the selector either as `"6"` or as `6`. Anything else counts as absent.
pub fn selector_from_json<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(selector)) => Some(selector),
        Some(Value::Number(selector)) => Some(selector.to_string()),
        _ => None,
    })
}
