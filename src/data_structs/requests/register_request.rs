use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::data_structs::requests::field_checks::{required, within_length};
use crate::error::FieldErrors;
use crate::password::{PasswordPolicy, UserAttributes};

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const NAME_MAX_LENGTH: usize = 150;

pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "A user with this email already exists.";

static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").unwrap());
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+(?:[A-Za-z]{2,63}|xn--[A-Za-z0-9]{1,59})$").unwrap()
});

#[derive(Debug, Default)]
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A registration whose fields passed every check that needs no database lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterRequest {

    /// Field checks run first and all of their errors are reported together. The password
    /// confirmation is only compared once every field is individually valid.
    pub fn validate(self, policy: &PasswordPolicy) -> Result<Registration, FieldErrors> {
        let mut errors = FieldErrors::new();

        let username = required("username", self.username, &mut errors).map(|u| u.trim().to_string());
        if let Some(username) = &username {
            if username.chars().count() > USERNAME_MAX_LENGTH {
                within_length("username", username, USERNAME_MAX_LENGTH, &mut errors);
            } else if !USERNAME_PATTERN.is_match(username) {
                errors.add("username", "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.");
            }
        }

        let email = required("email", self.email, &mut errors).map(|e| e.trim().to_string());
        if let Some(email) = &email {
            if email.chars().count() > EMAIL_MAX_LENGTH {
                within_length("email", email, EMAIL_MAX_LENGTH, &mut errors);
            } else if !EMAIL_PATTERN.is_match(email) {
                errors.add("email", "Enter a valid email address.");
            }
        }

        let first_name = self.first_name.map(|n| n.trim().to_string()).unwrap_or_default();
        within_length("first_name", &first_name, NAME_MAX_LENGTH, &mut errors);
        let last_name = self.last_name.map(|n| n.trim().to_string()).unwrap_or_default();
        within_length("last_name", &last_name, NAME_MAX_LENGTH, &mut errors);

        let password = required("password", self.password, &mut errors);
        if let Some(password) = &password {
            let attributes = UserAttributes {
                username: username.as_deref().unwrap_or_default(),
                email: email.as_deref().unwrap_or_default(),
                first_name: &first_name,
                last_name: &last_name,
            };
            for problem in policy.check(password, &attributes) {
                errors.add("password", problem);
            }
        }
        let password2 = required("password2", self.password2, &mut errors);

        let (Some(username), Some(email), Some(password), Some(password2)) = (username, email, password, password2) else {
            return Err(errors);
        };
        if !errors.is_empty() {
            return Err(errors);
        }
        if password != password2 {
            errors.add("password", "Password fields didn't match.");
            return Err(errors);
        }

        Ok(Registration { username, email, password, first_name, last_name })
    }
}
