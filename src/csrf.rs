use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse};
use actix_web::http::Method;
use actix_web::{HttpRequest, ResponseError};
use futures::future::LocalBoxFuture;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::utils::generate_token;

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_HEADER: &str = "X-CSRFToken";
const CSRF_TOKEN_LENGTH: usize = 64;

/// Anonymous entry points that cannot have fetched a token yet.
const EXEMPT_PREFIXES: [&str; 2] = ["/api/auth/register/", "/api/auth/login/"];

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

fn is_well_formed(token: &str) -> bool {
    token.len() == CSRF_TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_alphabetic())
}

/// Double-submit check: a state-changing request must echo the `csrftoken` cookie
/// in the `X-CSRFToken` header.
pub fn check_request(req: &HttpRequest) -> Result<(), ApiError> {
    if is_safe_method(req.method()) {
        return Ok(());
    }
    let path = req.path();
    if EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return Ok(());
    }

    let cookie = req.cookie(CSRF_COOKIE).ok_or(ApiError::CsrfFailed("CSRF cookie not set."))?;
    let header = req.headers().get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::CsrfFailed("CSRF token missing."))?;

    if cookie.value().is_empty() || !bool::from(cookie.value().as_bytes().ct_eq(header.as_bytes())) {
        return Err(ApiError::CsrfFailed("CSRF token incorrect."));
    }
    Ok(())
}

/// Request guard installed with `App::wrap_fn`. Rejected requests never reach a handler.
pub fn guard<S>(req: ServiceRequest, srv: &S) -> LocalBoxFuture<'static, Result<ServiceResponse, actix_web::Error>>
where
    S: Service<ServiceRequest, Response = ServiceResponse, Error = actix_web::Error>,
    S::Future: 'static,
{
    if let Err(e) = check_request(req.request()) {
        log::debug!("Rejected {} {}: {}", req.method(), req.path(), e);
        let response = req.into_response(e.error_response());
        return Box::pin(async move { Ok(response) });
    }
    Box::pin(srv.call(req))
}

/// Reuses the caller's token when it already holds a usable one, otherwise mints a new one.
pub fn token_for(req: &HttpRequest) -> String {
    match req.cookie(CSRF_COOKIE) {
        Some(cookie) if is_well_formed(cookie.value()) => cookie.value().to_string(),
        _ => generate_token(CSRF_TOKEN_LENGTH),
    }
}

/// Readable by the frontend's scripts, which copy it into the request header.
pub fn csrf_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(CSRF_COOKIE, token)
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(actix_web::cookie::time::Duration::days(365))
        .finish()
}
