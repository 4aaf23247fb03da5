use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_structs::subscription_duration::SubscriptionDuration;

#[derive(Debug, PartialEq, Eq)]
#[derive(Deserialize, Serialize)]
#[derive(Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Expired => "Expired",
            SubscriptionStatus::Cancelled => "Cancelled",
        }
    }
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            _ => Err(s.to_owned() + " is not a valid subscription status!")
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
#[derive(Deserialize, Serialize)]
#[derive(Clone)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub duration: SubscriptionDuration,
    pub price: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
}

/// A subscription about to be written. Price and end date are fixed here, at creation,
/// from the duration's table entry and are never recomputed afterwards.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: i64,
    pub duration: SubscriptionDuration,
    pub price: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
}

impl NewSubscription {

    pub fn starting_now(user_id: i64, duration: SubscriptionDuration) -> NewSubscription {
        let start_date = Utc::now();
        NewSubscription {
            user_id,
            duration,
            price: duration.price(),
            start_date,
            end_date: duration.end_date_from(start_date),
            gateway_order_id: None,
            gateway_payment_id: None,
        }
    }

    pub fn paid_through(mut self, order_id: &str, payment_id: &str) -> NewSubscription {
        self.gateway_order_id = Some(order_id.to_string());
        self.gateway_payment_id = Some(payment_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn new_subscription_takes_price_and_window_from_the_duration() {
        let subscription = NewSubscription::starting_now(7, SubscriptionDuration::SixMonths);
        assert_eq!(subscription.price, 9720);
        assert_eq!(subscription.end_date - subscription.start_date, Duration::days(180));
        assert_eq!(subscription.gateway_order_id, None);
    }

    #[test]
    fn paid_subscription_carries_gateway_references() {
        let subscription = NewSubscription::starting_now(7, SubscriptionDuration::OneMonth)
            .paid_through("order_abc", "pay_xyz");
        assert_eq!(subscription.gateway_order_id.as_deref(), Some("order_abc"));
        assert_eq!(subscription.gateway_payment_id.as_deref(), Some("pay_xyz"));
    }

    #[test]
    fn status_round_trips_through_its_code() {
        for status in [SubscriptionStatus::Active, SubscriptionStatus::Expired, SubscriptionStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(status));
        }
        assert!("paused".parse::<SubscriptionStatus>().is_err());
    }
}
