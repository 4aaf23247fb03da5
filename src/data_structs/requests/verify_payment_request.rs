use serde::Deserialize;

use crate::data_structs::requests::duration_request::selector_from_json;
use crate::data_structs::subscription_duration::SubscriptionDuration;

/// The checkout callback fields the frontend forwards after a payment.
#[derive(Debug, Default)]
#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    #[serde(default, deserialize_with = "selector_from_json")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub duration: SubscriptionDuration,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl VerifyPaymentRequest {
    /// `None` when any field is missing or empty, or the duration is not a known selector.
    pub fn into_callback(self) -> Option<PaymentCallback> {
        Some(PaymentCallback {
            order_id: non_empty(self.razorpay_order_id)?,
            payment_id: non_empty(self.razorpay_payment_id)?,
            signature: non_empty(self.razorpay_signature)?,
            duration: self.duration.as_deref().and_then(SubscriptionDuration::from_selector)?,
        })
    }
}
