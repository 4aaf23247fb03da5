use actix_web::error::JsonPayloadError;
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use serde_json::json;

use crate::error::ApiError;

pub mod auth_api;
pub mod payment_api;
pub mod profile_api;
pub mod subscription_api;

const AUTH_ROUTES: [(&str, &str); 11] = [
    ("csrf", "/api/auth/csrf/"),
    ("register", "/api/auth/register/"),
    ("login", "/api/auth/login/"),
    ("logout", "/api/auth/logout/"),
    ("check", "/api/auth/check/"),
    ("profile", "/api/auth/profile/"),
    ("profile_update", "/api/auth/profile/update/"),
    ("subscriptions", "/api/auth/subscriptions/"),
    ("create_subscription", "/api/auth/subscriptions/create/"),
    ("create_payment_order", "/api/auth/payment/create-order/"),
    ("verify_payment", "/api/auth/payment/verify/"),
];

#[get("/")]
async fn api_root() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Ananthom Backend API",
        "status": "running",
        "endpoints": { "auth": "/api/auth/" }
    }))
}

#[get("/api/")]
async fn api_info() -> impl Responder {
    let auth_routes: serde_json::Map<String, serde_json::Value> = AUTH_ROUTES.iter()
        .map(|(name, path)| (name.to_string(), json!(path)))
        .collect();
    HttpResponse::Ok().json(json!({
        "message": "Ananthom API",
        "version": "1.0",
        "available_endpoints": { "auth": auth_routes }
    }))
}

/// Unreadable request bodies get the same `{"error": ...}` shape as every other failure.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected request body: {}", err);
    ApiError::BadRequest(format!("Malformed request body: {}", err)).into()
}

/// Registers every route of the service on an `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(api_root)
        .service(api_info)
        .service(web::scope("/api/auth")
            .service(auth_api::csrf_token)
            .service(auth_api::register)
            .service(auth_api::login)
            .service(auth_api::logout)
            .service(auth_api::check_auth)
            .service(profile_api::get_profile)
            .service(profile_api::update_profile)
            .service(subscription_api::list_subscriptions)
            .service(subscription_api::create_subscription)
            .service(payment_api::create_order)
            .service(payment_api::verify_payment)
        );
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, read_body_json, TestRequest};
    use serde_json::{json, Value};

    use crate::test_support::{resources, test_app, TestClient};

    use super::AUTH_ROUTES;

    #[actix_web::test]
    async fn root_reports_that_the_service_runs() {
        let app = test_app!(resources(None));
        let resp = call_service(&app, TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["endpoints"]["auth"], "/api/auth/");
    }

    #[actix_web::test]
    async fn info_lists_every_auth_route() {
        let app = test_app!(resources(None));
        let body: Value = read_body_json(call_service(&app, TestRequest::get().uri("/api/").to_request()).await).await;
        assert_eq!(body["version"], "1.0");
        let routes = body["available_endpoints"]["auth"].as_object().unwrap();
        assert_eq!(routes.len(), AUTH_ROUTES.len());
        assert_eq!(routes["verify_payment"], "/api/auth/payment/verify/");
    }

    #[actix_web::test]
    async fn listed_routes_answer_their_own_methods() {
        let app = test_app!(resources(None));
        let client = TestClient::anonymous();
        for (name, path) in AUTH_ROUTES {
            let request = match name {
                "csrf" | "check" | "profile" | "subscriptions" => client.get(path),
                "profile_update" => client.put(path, json!({})),
                _ => client.post(path, json!({})),
            };
            let resp = call_service(&app, request.to_request()).await;
            assert_ne!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        }

        let resp = call_service(&app, client.patch("/api/auth/profile/update/", json!({})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = call_service(&app, client.post("/api/auth/register/", json!({})).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
