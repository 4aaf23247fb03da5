use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::csrf;
use crate::data_structs::requests::login_request::LoginRequest;
use crate::data_structs::requests::register_request::{RegisterRequest, EMAIL_TAKEN, USERNAME_TAKEN};
use crate::data_structs::responses::message_response::{CsrfTokenResponse, MessageResponse};
use crate::data_structs::responses::user_response::{LoginResponse, RegisterResponse, SessionCheckResponse, UserResponse};
use crate::data_structs::user::NewUser;
use crate::database::StoreError;
use crate::error::{ApiError, FieldErrors};
use crate::session::{self, SessionUser, SESSION_COOKIE};
use crate::SharedResources;

#[get("/csrf/")]
pub async fn csrf_token(data: web::Data<SharedResources>, req: HttpRequest) -> HttpResponse {
    let token = csrf::token_for(&req);
    HttpResponse::Ok()
        .cookie(csrf::csrf_cookie(token.clone(), data.session_settings.secure_cookies))
        .json(CsrfTokenResponse { csrf_token: token })
}

#[post("/register/")]
pub async fn register(data: web::Data<SharedResources>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let resources = data.get_ref();
    let database = &resources.database;

    let registration = payload.into_inner()
        .validate(&resources.password_policy)
        .map_err(ApiError::InvalidFields)?;

    let mut errors = FieldErrors::new();
    if database.username_exists(&registration.username).await? {
        errors.add("username", USERNAME_TAKEN);
    }
    if database.email_exists(&registration.email).await? {
        errors.add("email", EMAIL_TAKEN);
    }
    errors.into_result()?;

    let hasher = resources.password_hasher.clone();
    let password = registration.password;
    let password_hash = web::block(move || hasher.hash(&password)).await?;

    let new_user = NewUser {
        username: registration.username,
        email: registration.email,
        password_hash,
        first_name: registration.first_name,
        last_name: registration.last_name,
    };
    // a concurrent registration can still win the race past the checks above
    let user = match database.create_user_with_profile(&new_user).await {
        Ok(user) => user,
        Err(StoreError::Duplicate("username")) => return Err(ApiError::field("username", USERNAME_TAKEN)),
        Err(StoreError::Duplicate("email")) => return Err(ApiError::field("email", EMAIL_TAKEN)),
        Err(e) => return Err(e.into()),
    };

    let cookie = session::start_session(resources, user.id).await?;
    log::info!("Registered user {} (id {})", user.username, user.id);

    Ok(HttpResponse::Created().cookie(cookie).json(RegisterResponse {
        user: UserResponse::from(&user),
        message: "User registered successfully",
    }))
}

#[post("/login/")]
pub async fn login(data: web::Data<SharedResources>, req: HttpRequest, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let resources = data.get_ref();
    let database = &resources.database;

    let credentials = payload.into_inner().validate().map_err(ApiError::InvalidFields)?;
    let hasher = resources.password_hasher.clone();
    let password = credentials.password;
    let stored = match database.get_user_credentials(&credentials.username).await? {
        Some(stored) => stored,
        None => {
            web::block(move || hasher.verify_missing_account(&password)).await?;
            return Err(ApiError::InvalidCredentials);
        }
    };

    let stored_hash = stored.password_hash;
    if !web::block(move || hasher.verify(&password, &stored_hash)).await? {
        log::info!("Failed login for {}", stored.user.username);
        return Err(ApiError::InvalidCredentials);
    }

    // a session that existed before authenticating is never carried over
    if let Some(previous) = req.cookie(SESSION_COOKIE) {
        database.delete_session(previous.value()).await?;
    }
    let cookie = session::start_session(resources, stored.user.id).await?;
    let profile = database.get_or_create_profile(stored.user.id).await?;

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        user: UserResponse::from(&stored.user),
        has_address: profile.has_address(),
        message: "Login successful",
    }))
}

#[post("/logout/")]
pub async fn logout(data: web::Data<SharedResources>, session_user: SessionUser) -> Result<HttpResponse, ApiError> {
    data.database.delete_session(&session_user.session_token).await?;
    Ok(HttpResponse::Ok()
        .cookie(session::removal_cookie())
        .json(MessageResponse { message: "Logout successful" }))
}

#[get("/check/")]
pub async fn check_auth(data: web::Data<SharedResources>, session_user: Result<SessionUser, ApiError>) -> Result<HttpResponse, ApiError> {
    let response = match session_user {
        Ok(session_user) => {
            let profile = data.database.get_or_create_profile(session_user.user.id).await?;
            SessionCheckResponse {
                is_authenticated: true,
                user: Some(UserResponse::from(&session_user.user)),
                has_address: profile.has_address(),
            }
        }
        Err(ApiError::NotAuthenticated) => SessionCheckResponse { is_authenticated: false, user: None, has_address: false },
        Err(e) => return Err(e),
    };
    Ok(HttpResponse::Ok().json(response))
}
