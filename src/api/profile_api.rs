use actix_web::{get, route, web, HttpResponse};

use crate::data_structs::requests::profile_update::ProfileUpdate;
use crate::data_structs::responses::user_response::{ProfileResponse, ProfileUpdateResponse, UserResponse};
use crate::error::ApiError;
use crate::session::SessionUser;
use crate::SharedResources;

#[get("/profile/")]
pub async fn get_profile(data: web::Data<SharedResources>, session_user: SessionUser) -> Result<HttpResponse, ApiError> {
    let profile = data.database.get_or_create_profile(session_user.user.id).await?;
    Ok(HttpResponse::Ok().json(ProfileResponse {
        user: UserResponse::from(&session_user.user),
        profile,
    }))
}

#[route("/profile/update/", method = "PUT", method = "PATCH")]
pub async fn update_profile(data: web::Data<SharedResources>, session_user: SessionUser,
                            payload: web::Json<ProfileUpdate>) -> Result<HttpResponse, ApiError> {
    let database = &data.database;
    let stored = database.get_or_create_profile(session_user.user.id).await?;
    let profile = payload.into_inner().merge_into(&stored).map_err(ApiError::InvalidFields)?;
    database.save_profile(session_user.user.id, &profile).await?;

    Ok(HttpResponse::Ok().json(ProfileUpdateResponse {
        profile,
        message: "Profile updated successfully",
    }))
}
