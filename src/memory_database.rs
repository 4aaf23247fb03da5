use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::data_structs::payment_order::PaymentOrder;
use crate::data_structs::profile::Profile;
use crate::data_structs::subscription::{NewSubscription, Subscription, SubscriptionStatus};
use crate::data_structs::user::{NewUser, User, UserCredentials};
use crate::database::{Storage, StoreError};

struct StoredSession {
    user_id: i64,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_subscription_id: i64,
    users: Vec<UserCredentials>,
    profiles: HashMap<i64, Profile>,
    sessions: HashMap<String, StoredSession>,
    subscriptions: Vec<Subscription>,
    payment_orders: HashMap<String, PaymentOrder>,
}

/// Keeps everything in process memory behind one lock. Nothing survives a restart.
/// Username and email comparisons ignore case, like the MySQL collation does.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
}

impl MemoryDatabase {
    pub fn new() -> MemoryDatabase {
        MemoryDatabase::default()
    }
}

#[async_trait]
impl Storage for MemoryDatabase {

    async fn create_user_with_profile(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|c| c.user.username.eq_ignore_ascii_case(&new_user.username)) {
            return Err(StoreError::Duplicate("username"));
        }
        if tables.users.iter().any(|c| c.user.email.eq_ignore_ascii_case(&new_user.email)) {
            return Err(StoreError::Duplicate("email"));
        }

        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            is_staff: false,
            date_joined: Utc::now(),
        };
        tables.users.push(UserCredentials {
            user: user.clone(),
            password_hash: new_user.password_hash.clone(),
        });
        tables.profiles.insert(user.id, Profile::default());
        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().any(|c| c.user.username.eq_ignore_ascii_case(username)))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().any(|c| c.user.email.eq_ignore_ascii_case(email)))
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|c| c.user.id == user_id).map(|c| c.user.clone()))
    }

    async fn get_user_credentials(&self, username: &str) -> Result<Option<UserCredentials>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|c| c.user.username.eq_ignore_ascii_case(username)).cloned())
    }

    async fn set_staff(&self, user_id: i64, is_staff: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let credentials = tables.users.iter_mut()
            .find(|c| c.user.id == user_id)
            .ok_or(StoreError::Missing("user"))?;
        credentials.user.is_staff = is_staff;
        Ok(())
    }

    async fn get_or_create_profile(&self, user_id: i64) -> Result<Profile, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.profiles.entry(user_id).or_default().clone())
    }

    async fn save_profile(&self, user_id: i64, profile: &Profile) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.profiles.insert(user_id, profile.clone());
        Ok(())
    }

    async fn create_session(&self, session_token: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session_token.to_string(), StoredSession { user_id, expires_at });
        Ok(())
    }

    async fn find_session_user(&self, session_token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        let user_id = match tables.sessions.get(session_token) {
            Some(session) if session.expires_at > now => session.user_id,
            _ => return Ok(None),
        };
        Ok(tables.users.iter().find(|c| c.user.id == user_id).map(|c| c.user.clone()))
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.sessions.remove(session_token);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| session.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn create_subscription(&self, new_subscription: &NewSubscription) -> Result<Subscription, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(order_id) = &new_subscription.gateway_order_id {
            if tables.subscriptions.iter().any(|s| s.gateway_order_id.as_ref() == Some(order_id)) {
                return Err(StoreError::Duplicate("gateway_order_id"));
            }
        }

        tables.next_subscription_id += 1;
        let subscription = Subscription {
            id: tables.next_subscription_id,
            user_id: new_subscription.user_id,
            duration: new_subscription.duration,
            price: new_subscription.price,
            start_date: new_subscription.start_date,
            end_date: new_subscription.end_date,
            status: SubscriptionStatus::Active,
            created_at: new_subscription.start_date,
            gateway_order_id: new_subscription.gateway_order_id.clone(),
            gateway_payment_id: new_subscription.gateway_payment_id.clone(),
        };
        tables.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn get_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        let mut subscriptions: Vec<Subscription> = tables.subscriptions.iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(subscriptions)
    }

    async fn find_subscription_by_order(&self, gateway_order_id: &str) -> Result<Option<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.subscriptions.iter()
            .find(|s| s.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn expire_subscriptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut expired = 0;
        for subscription in tables.subscriptions.iter_mut() {
            if subscription.status == SubscriptionStatus::Active && subscription.end_date <= now {
                subscription.status = SubscriptionStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn create_payment_order(&self, order: &PaymentOrder) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.payment_orders.contains_key(&order.order_id) {
            return Err(StoreError::Duplicate("order_id"));
        }
        tables.payment_orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get_payment_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.payment_orders.get(order_id).cloned())
    }

    async fn mark_payment_order_paid(&self, order_id: &str, payment_id: &str, paid_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let order = tables.payment_orders.get_mut(order_id).ok_or(StoreError::Missing("payment order"))?;
        order.paid = true;
        order.payment_id = Some(payment_id.to_string());
        order.paid_at = Some(paid_at);
        Ok(())
    }
}
