use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::test::TestRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::csrf::{CSRF_COOKIE, CSRF_HEADER};
use crate::data_structs::payment_order::PaymentOrder;
use crate::data_structs::profile::Profile;
use crate::data_structs::subscription::{NewSubscription, Subscription};
use crate::data_structs::user::{NewUser, User, UserCredentials};
use crate::database::{Storage, StoreError};
use crate::memory_database::MemoryDatabase;
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::payment_signing::payment_signature;
use crate::razorpay_util::{CreateOrderRequest, GatewayCredentials, GatewayError, GatewayOrder, PaymentGateway};
use crate::session::{SessionSettings, SESSION_COOKIE};
use crate::utils::generate_token;
use crate::SharedResources;

pub const KEY_ID: &str = "rzp_test_stub";
pub const KEY_SECRET: &str = "stub_secret";

/// Hands out sequential order ids without talking to anyone.
pub struct StubGateway {
    credentials: GatewayCredentials,
    orders_created: AtomicUsize,
    reject_with: Option<String>,
}

impl StubGateway {
    pub fn new() -> StubGateway {
        StubGateway {
            credentials: GatewayCredentials { key_id: KEY_ID.to_string(), key_secret: KEY_SECRET.to_string() },
            orders_created: AtomicUsize::new(0),
            reject_with: None,
        }
    }

    pub fn rejecting(message: &str) -> StubGateway {
        StubGateway { reject_with: Some(message.to_string()), ..StubGateway::new() }
    }

    pub fn orders_created(&self) -> usize {
        self.orders_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn credentials(&self) -> &GatewayCredentials {
        &self.credentials
    }

    fn currency(&self) -> &str {
        "INR"
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        if let Some(message) = &self.reject_with {
            return Err(GatewayError::Rejected { status: 400, message: message.clone() });
        }
        let n = self.orders_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_stub{}", n),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".to_string()),
        })
    }
}

/// A memory store that can be told to misbehave.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryDatabase,
    /// Session lookups fail as if the database were down.
    pub session_lookups_fail: AtomicBool,
    /// The next order lookup finds nothing, but another verification of the
    /// same order stores its subscription right after.
    pub rival_verification: AtomicBool,
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn create_user_with_profile(&self, new_user: &NewUser) -> Result<User, StoreError> {
        self.inner.create_user_with_profile(new_user).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        self.inner.username_exists(username).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        self.inner.email_exists(email).await
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_credentials(&self, username: &str) -> Result<Option<UserCredentials>, StoreError> {
        self.inner.get_user_credentials(username).await
    }

    async fn set_staff(&self, user_id: i64, is_staff: bool) -> Result<(), StoreError> {
        self.inner.set_staff(user_id, is_staff).await
    }

    async fn get_or_create_profile(&self, user_id: i64) -> Result<Profile, StoreError> {
        self.inner.get_or_create_profile(user_id).await
    }

    async fn save_profile(&self, user_id: i64, profile: &Profile) -> Result<(), StoreError> {
        self.inner.save_profile(user_id, profile).await
    }

    async fn create_session(&self, session_token: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.create_session(session_token, user_id, expires_at).await
    }

    async fn find_session_user(&self, session_token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError> {
        if self.session_lookups_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.find_session_user(session_token, now).await
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), StoreError> {
        self.inner.delete_session(session_token).await
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_expired_sessions(now).await
    }

    async fn create_subscription(&self, new_subscription: &NewSubscription) -> Result<Subscription, StoreError> {
        self.inner.create_subscription(new_subscription).await
    }

    async fn get_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        self.inner.get_subscriptions(user_id).await
    }

    async fn find_subscription_by_order(&self, gateway_order_id: &str) -> Result<Option<Subscription>, StoreError> {
        if self.rival_verification.swap(false, Ordering::SeqCst) {
            let order = self.inner.get_payment_order(gateway_order_id).await?
                .ok_or(StoreError::Missing("payment order"))?;
            let rival = NewSubscription::starting_now(order.user_id, order.duration)
                .paid_through(gateway_order_id, "pay_rival");
            self.inner.create_subscription(&rival).await?;
            return Ok(None);
        }
        self.inner.find_subscription_by_order(gateway_order_id).await
    }

    async fn expire_subscriptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.expire_subscriptions(now).await
    }

    async fn create_payment_order(&self, order: &PaymentOrder) -> Result<(), StoreError> {
        self.inner.create_payment_order(order).await
    }

    async fn get_payment_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, StoreError> {
        self.inner.get_payment_order(order_id).await
    }

    async fn mark_payment_order_paid(&self, order_id: &str, payment_id: &str, paid_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.mark_payment_order_paid(order_id, payment_id, paid_at).await
    }
}

/// Memory store, cheap password hashing and the given gateway.
pub fn resources(payment_gateway: Option<Arc<dyn PaymentGateway>>) -> SharedResources {
    resources_with_storage(Arc::new(MemoryDatabase::new()), payment_gateway)
}

pub fn resources_with_storage(database: Arc<dyn Storage>, payment_gateway: Option<Arc<dyn PaymentGateway>>) -> SharedResources {
    SharedResources {
        database,
        payment_gateway,
        password_policy: Arc::new(PasswordPolicy::standard(8)),
        password_hasher: PasswordHasher::new(NonZeroU32::new(1_000).unwrap()),
        session_settings: SessionSettings { ttl: chrono::Duration::days(14), secure_cookies: false },
    }
}

/// The full service as `main` assembles it, minus CORS and access logs.
macro_rules! test_app {
    ($resources:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($resources))
                .wrap_fn(crate::csrf::guard)
                .configure(crate::api::configure),
        )
        .await
    };
}
pub(crate) use test_app;

/// Plays the browser: carries the session cookie and echoes the CSRF token.
pub struct TestClient {
    pub session: Option<Cookie<'static>>,
    pub csrf_token: String,
}

impl TestClient {
    pub fn anonymous() -> TestClient {
        TestClient { session: None, csrf_token: generate_token(64) }
    }

    pub fn with_session(session: Cookie<'static>) -> TestClient {
        TestClient { session: Some(session), ..TestClient::anonymous() }
    }

    fn prepare(&self, request: TestRequest) -> TestRequest {
        let request = request
            .cookie(Cookie::new(CSRF_COOKIE, self.csrf_token.clone()))
            .insert_header((CSRF_HEADER, self.csrf_token.clone()));
        match &self.session {
            Some(session) => request.cookie(session.clone()),
            None => request,
        }
    }

    pub fn get(&self, uri: &str) -> TestRequest {
        self.prepare(TestRequest::get().uri(uri))
    }

    pub fn post(&self, uri: &str, body: Value) -> TestRequest {
        self.prepare(TestRequest::post().uri(uri).set_json(body))
    }

    pub fn patch(&self, uri: &str, body: Value) -> TestRequest {
        self.prepare(TestRequest::patch().uri(uri).set_json(body))
    }

    pub fn put(&self, uri: &str, body: Value) -> TestRequest {
        self.prepare(TestRequest::put().uri(uri).set_json(body))
    }
}

pub fn session_cookie<B>(response: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    response.response().cookies()
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.into_owned())
}

pub fn registration(username: &str, email: &str) -> Value {
    json!({
        "username": username,
        "email": email,
        "password": "Str0ngPW!",
        "password2": "Str0ngPW!",
    })
}

pub fn complete_address() -> Value {
    json!({
        "address_line1": "12 MG Road",
        "city": "Pune",
        "state": "Maharashtra",
        "postal_code": "411001",
        "country": "India",
        "phone": "+91 98200 00000",
    })
}

/// A checkout callback signed the way the gateway signs it.
pub fn signed_callback(order_id: &str, payment_id: &str, duration: &str) -> Value {
    json!({
        "razorpay_order_id": order_id,
        "razorpay_payment_id": payment_id,
        "razorpay_signature": payment_signature(KEY_SECRET, order_id, payment_id),
        "duration": duration,
    })
}
