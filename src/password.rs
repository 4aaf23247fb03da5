use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::pbkdf2;

use crate::utils;

static PBKDF2_ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const HASH_PREFIX: &str = "pbkdf2_sha256";
const SALT_LENGTH: usize = 22;
const CREDENTIAL_LEN: usize = 32;
const MISSING_ACCOUNT_SALT: &[u8] = b"missing-account-salt";

/// Hashes and checks passwords as `pbkdf2_sha256$<iterations>$<salt>$<base64 hash>`.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
}

impl PasswordHasher {

    pub fn new(iterations: NonZeroU32) -> PasswordHasher {
        PasswordHasher { iterations }
    }

    pub fn hash(&self, password: &str) -> String {
        let salt = utils::generate_token(SALT_LENGTH);
        let mut credential = [0u8; CREDENTIAL_LEN];
        pbkdf2::derive(PBKDF2_ALGORITHM, self.iterations, salt.as_bytes(), password.as_bytes(), &mut credential);
        format!("{}${}${}${}", HASH_PREFIX, self.iterations, salt, STANDARD.encode(credential))
    }

    /// Checks a password against a stored hash. The iteration count is read from the hash,
    /// so hashes written under an older setting keep working. Malformed hashes never match.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let parts: Vec<&str> = stored_hash.split('$').collect();
        if parts.len() != 4 || parts[0] != HASH_PREFIX {
            return false;
        }
        let iterations = match parts[1].parse::<u32>().ok().and_then(NonZeroU32::new) {
            Some(iterations) => iterations,
            None => return false,
        };
        let expected = match STANDARD.decode(parts[3]) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        // ring compares in constant time
        pbkdf2::verify(PBKDF2_ALGORITHM, iterations, parts[2].as_bytes(), password.as_bytes(), &expected).is_ok()
    }

    /// Spends the same work as `verify` for a login whose username does not exist, so the
    /// response time does not reveal which usernames are registered. Always fails.
    pub fn verify_missing_account(&self, password: &str) -> bool {
        let mut credential = [0u8; CREDENTIAL_LEN];
        pbkdf2::derive(PBKDF2_ALGORITHM, self.iterations, MISSING_ACCOUNT_SALT, password.as_bytes(), &mut credential);
        false
    }
}

/// What a validator may compare a password against.
#[derive(Debug, Default, Clone)]
pub struct UserAttributes<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

pub trait PasswordValidator: Send + Sync {
    /// Returns a message describing why the password is unacceptable.
    fn validate(&self, password: &str, user: &UserAttributes) -> Result<(), String>;
}

pub struct MinimumLengthValidator {
    pub min_length: usize,
}

impl PasswordValidator for MinimumLengthValidator {
    fn validate(&self, password: &str, _user: &UserAttributes) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            return Err(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ));
        }
        Ok(())
    }
}

/// Rejects passwords that contain, or are contained in, one of the user's own attributes.
pub struct UserAttributeSimilarityValidator;

impl PasswordValidator for UserAttributeSimilarityValidator {
    fn validate(&self, password: &str, user: &UserAttributes) -> Result<(), String> {
        let password = password.to_lowercase();
        let email_local_part = user.email.split('@').next().unwrap_or_default();
        let attributes = [
            ("username", user.username),
            ("email address", email_local_part),
            ("first name", user.first_name),
            ("last name", user.last_name),
        ];
        for (name, value) in attributes {
            let value = value.trim().to_lowercase();
            if value.chars().count() < 3 {
                continue;
            }
            if password.contains(&value) || value.contains(&password) {
                return Err(format!("The password is too similar to the {}.", name));
            }
        }
        Ok(())
    }
}

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "password1",
    "password123", "welcome", "admin", "admin123", "passw0rd", "p@ssw0rd", "qwerty123",
];

pub struct CommonPasswordValidator;

impl PasswordValidator for CommonPasswordValidator {
    fn validate(&self, password: &str, _user: &UserAttributes) -> Result<(), String> {
        let lowered = password.trim().to_lowercase();
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            return Err("This password is too common.".to_string());
        }
        Ok(())
    }
}

pub struct NumericPasswordValidator;

impl PasswordValidator for NumericPasswordValidator {
    fn validate(&self, password: &str, _user: &UserAttributes) -> Result<(), String> {
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            return Err("This password is entirely numeric.".to_string());
        }
        Ok(())
    }
}

/// An ordered set of validators; every failing validator contributes one message.
pub struct PasswordPolicy {
    validators: Vec<Box<dyn PasswordValidator>>,
}

impl PasswordPolicy {

    pub fn new(validators: Vec<Box<dyn PasswordValidator>>) -> PasswordPolicy {
        PasswordPolicy { validators }
    }

    pub fn standard(min_length: usize) -> PasswordPolicy {
        PasswordPolicy::new(vec![
            Box::new(UserAttributeSimilarityValidator),
            Box::new(MinimumLengthValidator { min_length }),
            Box::new(CommonPasswordValidator),
            Box::new(NumericPasswordValidator),
        ])
    }

    pub fn check(&self, password: &str, user: &UserAttributes) -> Vec<String> {
        self.validators.iter()
            .filter_map(|validator| validator.validate(password, user).err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(NonZeroU32::new(1_000).unwrap())
    }

    fn alice() -> UserAttributes<'static> {
        UserAttributes {
            username: "alice",
            email: "alice@x.com",
            first_name: "",
            last_name: "",
        }
    }

    #[test]
    fn hash_verifies_the_original_password_only() {
        let hasher = hasher();
        let hash = hasher.hash("Str0ngPW!");
        assert!(hash.starts_with("pbkdf2_sha256$1000$"));
        assert!(hasher.verify("Str0ngPW!", &hash));
        assert!(!hasher.verify("Str0ngPW?", &hash));
        assert!(!hasher.verify("", &hash));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = hasher();
        assert_ne!(hasher.hash("same password"), hasher.hash("same password"));
    }

    #[test]
    fn iterations_are_taken_from_the_stored_hash() {
        let old = PasswordHasher::new(NonZeroU32::new(500).unwrap()).hash("Str0ngPW!");
        assert!(hasher().verify("Str0ngPW!", &old));
    }

    #[test]
    fn missing_accounts_never_verify() {
        let hasher = hasher();
        assert!(!hasher.verify_missing_account("Str0ngPW!"));
        assert!(!hasher.verify_missing_account(""));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        let hasher = hasher();
        for stored in ["", "plain", "md5$1$salt$abc", "pbkdf2_sha256$0$salt$abc", "pbkdf2_sha256$10$salt$%%%"] {
            assert!(!hasher.verify("anything", stored), "{stored}");
        }
    }

    #[test]
    fn strong_password_passes_the_standard_policy() {
        assert!(PasswordPolicy::standard(8).check("Str0ngPW!", &alice()).is_empty());
    }

    #[test]
    fn weak_passwords_collect_every_problem() {
        let problems = PasswordPolicy::standard(8).check("123456", &alice());
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("too short")));
        assert!(problems.iter().any(|p| p.contains("too common")));
        assert!(problems.iter().any(|p| p.contains("entirely numeric")));
    }

    #[test]
    fn passwords_built_from_the_username_are_rejected() {
        let problems = PasswordPolicy::standard(8).check("Alice2024!", &alice());
        assert_eq!(problems, vec!["The password is too similar to the username.".to_string()]);
    }

    #[test]
    fn policy_is_pluggable() {
        let policy = PasswordPolicy::new(vec![Box::new(MinimumLengthValidator { min_length: 20 })]);
        assert_eq!(policy.check("Str0ngPW!", &alice()).len(), 1);
        assert!(PasswordPolicy::new(Vec::new()).check("1", &alice()).is_empty());
    }
}
