use actix_web::{post, web, HttpResponse};
use chrono::Utc;

use crate::api::subscription_api::require_address;
use crate::data_structs::payment_order::PaymentOrder;
use crate::data_structs::requests::duration_request::DurationRequest;
use crate::data_structs::requests::verify_payment_request::VerifyPaymentRequest;
use crate::data_structs::responses::payment_response::OrderCreatedResponse;
use crate::data_structs::responses::subscription_response::{SubscriptionCreatedResponse, SubscriptionResponse};
use crate::data_structs::subscription::{NewSubscription, Subscription};
use crate::data_structs::user::User;
use crate::database::StoreError;
use crate::error::ApiError;
use crate::payment_signing::verify_payment_signature;
use crate::razorpay_util::CreateOrderRequest;
use crate::session::SessionUser;
use crate::utils::generate_token;
use crate::SharedResources;

fn receipt_for(user_id: i64) -> String {
    // the gateway caps receipts at 40 characters
    format!("rcpt_{}_{}", user_id, generate_token(12))
}

fn already_verified(subscription: &Subscription, user: &User) -> HttpResponse {
    HttpResponse::Ok().json(SubscriptionCreatedResponse {
        subscription: SubscriptionResponse::new(subscription, user),
        message: "Payment already verified",
    })
}

#[post("/payment/create-order/")]
pub async fn create_order(data: web::Data<SharedResources>, session_user: SessionUser,
                          payload: web::Json<DurationRequest>) -> Result<HttpResponse, ApiError> {
    let user = &session_user.user;
    require_address(&data, user.id).await?;
    let duration = payload.duration()
        .ok_or_else(|| ApiError::BadRequest("Invalid duration".to_string()))?;
    let gateway = data.payment_gateway.as_ref().ok_or(ApiError::GatewayNotConfigured)?;

    let request = CreateOrderRequest {
        amount: duration.amount_in_minor_units(),
        currency: gateway.currency().to_string(),
        receipt: receipt_for(user.id),
        payment_capture: 1,
    };
    let order = gateway.create_order(&request).await.map_err(|e| {
        log::error!("Order creation for user {} failed: {}", user.id, e);
        e
    })?;

    data.database.create_payment_order(&PaymentOrder {
        order_id: order.id.clone(),
        user_id: user.id,
        duration,
        amount: request.amount,
        currency: request.currency.clone(),
        paid: false,
        payment_id: None,
        created_at: Utc::now(),
        paid_at: None,
    }).await?;
    log::info!("Opened order {} for user {} ({}, {} {})", order.id, user.id, duration, request.amount, request.currency);

    Ok(HttpResponse::Ok().json(OrderCreatedResponse {
        order_id: order.id,
        amount: request.amount,
        currency: request.currency,
        razorpay_key: gateway.credentials().key_id.clone(),
        user_name: user.username.clone(),
        user_email: user.email.clone(),
    }))
}

/// Turns a signed checkout callback into a subscription. Verifying the same order again
/// returns the subscription it already produced.
#[post("/payment/verify/")]
pub async fn verify_payment(data: web::Data<SharedResources>, session_user: SessionUser,
                            payload: web::Json<VerifyPaymentRequest>) -> Result<HttpResponse, ApiError> {
    let user = &session_user.user;
    let database = &data.database;

    let callback = payload.into_inner().into_callback()
        .ok_or_else(|| ApiError::BadRequest("Missing payment details".to_string()))?;
    let gateway = data.payment_gateway.as_ref().ok_or(ApiError::GatewayNotConfigured)?;

    if !verify_payment_signature(&gateway.credentials().key_secret, &callback.order_id, &callback.payment_id, &callback.signature) {
        log::warn!("Rejected payment {} for order {}: bad signature", callback.payment_id, callback.order_id);
        return Err(ApiError::SignatureMismatch);
    }

    let order = match database.get_payment_order(&callback.order_id).await? {
        Some(order) if order.user_id == user.id => order,
        _ => {
            log::warn!("User {} verified order {} which they never opened", user.id, callback.order_id);
            return Err(ApiError::UnknownOrder);
        }
    };
    if !order.matches_price_of(callback.duration) {
        log::warn!("Order {} was opened for {} ({}) but verified as {}",
            order.order_id, order.duration, order.amount, callback.duration);
        return Err(ApiError::AmountMismatch);
    }

    if let Some(existing) = database.find_subscription_by_order(&order.order_id).await? {
        if !order.paid {
            database.mark_payment_order_paid(&order.order_id, &callback.payment_id, Utc::now()).await?;
        }
        return Ok(already_verified(&existing, user));
    }

    let new_subscription = NewSubscription::starting_now(user.id, callback.duration)
        .paid_through(&order.order_id, &callback.payment_id);
    let subscription = match database.create_subscription(&new_subscription).await {
        Ok(subscription) => subscription,
        Err(StoreError::Duplicate(_)) => {
            // a concurrent verification of the same order inserted first
            let existing = database.find_subscription_by_order(&order.order_id).await?
                .ok_or(StoreError::Missing("subscription"))?;
            return Ok(already_verified(&existing, user));
        }
        Err(e) => return Err(e.into()),
    };
    database.mark_payment_order_paid(&order.order_id, &callback.payment_id, Utc::now()).await?;
    log::info!("Payment {} verified, subscription {} created for user {}", callback.payment_id, subscription.id, user.id);

    Ok(HttpResponse::Created().json(SubscriptionCreatedResponse {
        subscription: SubscriptionResponse::new(&subscription, user),
        message: "Payment verified and subscription created successfully",
    }))
}
