use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_structs::subscription_duration::SubscriptionDuration;

/// Local record of an order opened on the payment gateway. Verification checks the
/// callback against this record so that the stored subscription matches what was charged.
#[derive(Debug, PartialEq, Eq)]
#[derive(Deserialize, Serialize)]
#[derive(Clone)]
pub struct PaymentOrder {
    pub order_id: String,
    pub user_id: i64,
    pub duration: SubscriptionDuration,
    pub amount: i64,
    pub currency: String,
    pub paid: bool,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentOrder {

    /// The amount this order must carry for its duration, in minor units.
    pub fn matches_price_of(&self, duration: SubscriptionDuration) -> bool {
        self.duration == duration && self.amount == duration.amount_in_minor_units()
    }
}
