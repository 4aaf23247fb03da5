use actix_web::{get, post, web, HttpResponse};

use crate::data_structs::requests::duration_request::DurationRequest;
use crate::data_structs::responses::subscription_response::{SubscriptionCreatedResponse, SubscriptionListResponse, SubscriptionResponse};
use crate::data_structs::subscription::NewSubscription;
use crate::error::ApiError;
use crate::session::SessionUser;
use crate::SharedResources;

const INVALID_DURATION_CHOICE: &str = "Invalid duration. Please choose 1, 3, 6, 9, or 12 months.";

/// Purchases ship to the profile address, so one has to exist first.
pub async fn require_address(resources: &SharedResources, user_id: i64) -> Result<(), ApiError> {
    let profile = resources.database.get_or_create_profile(user_id).await?;
    if profile.has_address() {
        Ok(())
    } else {
        Err(ApiError::AddressRequired)
    }
}

#[get("/subscriptions/")]
pub async fn list_subscriptions(data: web::Data<SharedResources>, session_user: SessionUser) -> Result<HttpResponse, ApiError> {
    let subscriptions = data.database.get_subscriptions(session_user.user.id).await?;
    Ok(HttpResponse::Ok().json(SubscriptionListResponse {
        subscriptions: subscriptions.iter()
            .map(|subscription| SubscriptionResponse::new(subscription, &session_user.user))
            .collect(),
    }))
}

/// Creates a subscription without a payment. Only staff accounts may do this,
/// everyone else goes through the payment flow.
#[post("/subscriptions/create/")]
pub async fn create_subscription(data: web::Data<SharedResources>, session_user: SessionUser,
                                 payload: web::Json<DurationRequest>) -> Result<HttpResponse, ApiError> {
    let user = &session_user.user;
    if !user.is_staff {
        return Err(ApiError::Forbidden);
    }
    require_address(&data, user.id).await?;
    let duration = payload.duration()
        .ok_or_else(|| ApiError::BadRequest(INVALID_DURATION_CHOICE.to_string()))?;

    let subscription = data.database
        .create_subscription(&NewSubscription::starting_now(user.id, duration)).await?;
    log::info!("Staff user {} created a {} subscription (id {})", user.username, duration, subscription.id);

    Ok(HttpResponse::Created().json(SubscriptionCreatedResponse {
        subscription: SubscriptionResponse::new(&subscription, user),
        message: "Subscription created successfully",
    }))
}

#[cfg(test)]
mod tests {
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, read_body_json};
    use chrono::{DateTime, Duration, Utc};
    use serde_json::{json, Value};

    use crate::test_support::{complete_address, registration, resources, session_cookie, test_app, TestClient};

    fn date(value: &Value) -> DateTime<Utc> {
        value.as_str().unwrap().parse().unwrap()
    }

    fn user_id(body: &Value) -> i64 {
        body["user"]["id"].as_i64().unwrap()
    }

    async fn body(resp: ServiceResponse) -> Value {
        read_body_json(resp).await
    }

    #[actix_web::test]
    async fn staff_subscribe_after_adding_an_address() {
        let resources = resources(None);
        let database = resources.database.clone();
        let app = test_app!(resources);

        let resp = call_service(&app, TestClient::anonymous()
            .post("/api/auth/register/", registration("alice", "alice@x.com")).to_request()).await;
        let client = TestClient::with_session(session_cookie(&resp).unwrap());
        database.set_staff(user_id(&body(resp).await), true).await.unwrap();

        let resp = call_service(&app, client.put("/api/auth/profile/update/", complete_address()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let before = Utc::now();
        let resp = call_service(&app, client.post("/api/auth/subscriptions/create/", json!({"duration": "6"})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body(resp).await;
        let subscription = &created["subscription"];
        assert_eq!(subscription["price"], 9720);
        assert_eq!(subscription["duration"], "6_months");
        assert_eq!(subscription["duration_display"], "6 Months");
        assert_eq!(subscription["status"], "active");
        assert_eq!(subscription["user"]["username"], "alice");
        let start = date(&subscription["start_date"]);
        assert!(start >= before);
        assert_eq!(date(&subscription["end_date"]) - start, Duration::days(180));
    }

    #[actix_web::test]
    async fn three_months_costs_5130_and_lasts_90_days() {
        let resources = resources(None);
        let database = resources.database.clone();
        let app = test_app!(resources);
        let resp = call_service(&app, TestClient::anonymous()
            .post("/api/auth/register/", registration("alice", "alice@x.com")).to_request()).await;
        let client = TestClient::with_session(session_cookie(&resp).unwrap());
        database.set_staff(user_id(&body(resp).await), true).await.unwrap();
        call_service(&app, client.put("/api/auth/profile/update/", complete_address()).to_request()).await;

        let created = body(call_service(&app, client.post("/api/auth/subscriptions/create/", json!({"duration": " 3 "})).to_request()).await).await;
        let subscription = &created["subscription"];
        assert_eq!(subscription["price"], 5130);
        assert_eq!(date(&subscription["end_date"]) - date(&subscription["start_date"]), Duration::days(90));
    }

    #[actix_web::test]
    async fn regular_users_cannot_subscribe_without_paying() {
        let app = test_app!(resources(None));
        let resp = call_service(&app, TestClient::anonymous()
            .post("/api/auth/register/", registration("alice", "alice@x.com")).to_request()).await;
        let client = TestClient::with_session(session_cookie(&resp).unwrap());
        call_service(&app, client.put("/api/auth/profile/update/", complete_address()).to_request()).await;

        let resp = call_service(&app, client.post("/api/auth/subscriptions/create/", json!({"duration": "6"})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let listed = body(call_service(&app, client.get("/api/auth/subscriptions/").to_request()).await).await;
        assert_eq!(listed["subscriptions"], json!([]));
    }

    #[actix_web::test]
    async fn missing_address_wins_over_a_bad_duration() {
        let resources = resources(None);
        let database = resources.database.clone();
        let app = test_app!(resources);
        let resp = call_service(&app, TestClient::anonymous()
            .post("/api/auth/register/", registration("alice", "alice@x.com")).to_request()).await;
        let client = TestClient::with_session(session_cookie(&resp).unwrap());
        database.set_staff(user_id(&body(resp).await), true).await.unwrap();

        for duration in ["6", "7", ""] {
            let resp = call_service(&app, client.post("/api/auth/subscriptions/create/", json!({"duration": duration})).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body(resp).await["error"], "Please add your address before subscribing");
        }
    }

    #[actix_web::test]
    async fn unknown_durations_are_rejected() {
        let resources = resources(None);
        let database = resources.database.clone();
        let app = test_app!(resources);
        let resp = call_service(&app, TestClient::anonymous()
            .post("/api/auth/register/", registration("alice", "alice@x.com")).to_request()).await;
        let client = TestClient::with_session(session_cookie(&resp).unwrap());
        database.set_staff(user_id(&body(resp).await), true).await.unwrap();
        call_service(&app, client.put("/api/auth/profile/update/", complete_address()).to_request()).await;

        for duration in [json!("2"), json!("1_month"), json!("abc"), json!(null)] {
            let resp = call_service(&app, client.post("/api/auth/subscriptions/create/", json!({"duration": duration})).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{duration}");
            assert_eq!(body(resp).await["error"], "Invalid duration. Please choose 1, 3, 6, 9, or 12 months.");
        }
    }

    #[actix_web::test]
    async fn subscriptions_are_listed_newest_first() {
        let resources = resources(None);
        let database = resources.database.clone();
        let app = test_app!(resources);
        let resp = call_service(&app, TestClient::anonymous()
            .post("/api/auth/register/", registration("alice", "alice@x.com")).to_request()).await;
        let client = TestClient::with_session(session_cookie(&resp).unwrap());
        database.set_staff(user_id(&body(resp).await), true).await.unwrap();
        call_service(&app, client.put("/api/auth/profile/update/", complete_address()).to_request()).await;

        for duration in ["1", "12"] {
            call_service(&app, client.post("/api/auth/subscriptions/create/", json!({"duration": duration})).to_request()).await;
        }

        let listed = body(call_service(&app, client.get("/api/auth/subscriptions/").to_request()).await).await;
        let durations: Vec<&str> = listed["subscriptions"].as_array().unwrap().iter()
            .map(|s| s["duration"].as_str().unwrap())
            .collect();
        assert_eq!(durations, vec!["12_months", "1_month"]);
    }

    #[actix_web::test]
    async fn listing_requires_a_session() {
        let app = test_app!(resources(None));
        let resp = call_service(&app, TestClient::anonymous().get("/api/auth/subscriptions/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
