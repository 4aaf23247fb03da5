use serde::Deserialize;

use crate::data_structs::requests::field_checks::required;
use crate::error::FieldErrors;

#[derive(Debug, Default)]
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(self) -> Result<LoginCredentials, FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = required("username", self.username, &mut errors);
        let password = required("password", self.password, &mut errors);
        match (username, password) {
            (Some(username), Some(password)) => Ok(LoginCredentials { username: username.trim().to_string(), password }),
            _ => Err(errors),
        }
    }
}
