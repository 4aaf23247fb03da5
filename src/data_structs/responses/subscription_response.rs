use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data_structs::responses::user_response::UserResponse;
use crate::data_structs::subscription::{Subscription, SubscriptionStatus};
use crate::data_structs::subscription_duration::SubscriptionDuration;
use crate::data_structs::user::User;

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub user: UserResponse,
    pub duration: SubscriptionDuration,
    pub duration_display: &'static str,
    pub price: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub status_display: &'static str,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionResponse {
    pub fn new(subscription: &Subscription, owner: &User) -> SubscriptionResponse {
        SubscriptionResponse {
            id: subscription.id,
            user: UserResponse::from(owner),
            duration: subscription.duration,
            duration_display: subscription.duration.display_name(),
            price: subscription.price,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            status: subscription.status,
            status_display: subscription.status.display_name(),
            created_at: subscription.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionCreatedResponse {
    pub subscription: SubscriptionResponse,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
}
