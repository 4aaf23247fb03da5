use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::Utc;
use futures::future::LocalBoxFuture;

use crate::data_structs::user::User;
use crate::error::ApiError;
use crate::utils::generate_token;
use crate::SharedResources;

pub const SESSION_COOKIE: &str = "sessionid";
const SESSION_TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: chrono::Duration,
    pub secure_cookies: bool,
}

/// The user behind the request's session cookie. Extracting it fails with 401 when the
/// cookie is absent, unknown or expired. Anonymous-safe routes extract
/// `Result<SessionUser, ApiError>` and treat only `NotAuthenticated` as anonymous.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user: User,
    pub session_token: String,
}

impl FromRequest for SessionUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<SessionUser, ApiError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let resources = req.app_data::<web::Data<SharedResources>>().cloned();
        let session_token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());

        Box::pin(async move {
            let (resources, session_token) = match (resources, session_token) {
                (Some(resources), Some(token)) if !token.is_empty() => (resources, token),
                _ => return Err(ApiError::NotAuthenticated),
            };
            match resources.database.find_session_user(&session_token, Utc::now()).await? {
                Some(user) => Ok(SessionUser { user, session_token }),
                None => Err(ApiError::NotAuthenticated),
            }
        })
    }
}

/// Stores a fresh session for the user and returns the cookie that carries it.
pub async fn start_session(resources: &SharedResources, user_id: i64) -> Result<Cookie<'static>, ApiError> {
    let session_token = generate_token(SESSION_TOKEN_LENGTH);
    let expires_at = Utc::now() + resources.session_settings.ttl;
    resources.database.create_session(&session_token, user_id, expires_at).await?;
    Ok(session_cookie(session_token, &resources.session_settings))
}

pub fn session_cookie(session_token: String, settings: &SessionSettings) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, session_token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .max_age(actix_web::cookie::time::Duration::seconds(settings.ttl.num_seconds()))
        .finish()
}

/// A cookie that makes the browser drop its session id.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}
