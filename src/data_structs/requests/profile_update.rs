use serde::Deserialize;

use crate::data_structs::profile::Profile;
use crate::data_structs::requests::field_checks::within_length;
use crate::error::FieldErrors;

pub const ADDRESS_LINE_MAX_LENGTH: usize = 255;
pub const REGION_MAX_LENGTH: usize = 100;
pub const POSTAL_CODE_MAX_LENGTH: usize = 20;
pub const PHONE_MAX_LENGTH: usize = 20;

/// A partial profile update. Absent fields keep their stored value; unknown fields are ignored.
#[derive(Debug, Default)]
#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {

    /// Validates every supplied field, then merges them into a copy of `profile`.
    /// Nothing is merged when any field is invalid.
    pub fn merge_into(self, profile: &Profile) -> Result<Profile, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut merged = profile.clone();

        let updates = [
            ("address_line1", self.address_line1, ADDRESS_LINE_MAX_LENGTH, &mut merged.address_line1),
            ("address_line2", self.address_line2, ADDRESS_LINE_MAX_LENGTH, &mut merged.address_line2),
            ("city", self.city, REGION_MAX_LENGTH, &mut merged.city),
            ("state", self.state, REGION_MAX_LENGTH, &mut merged.state),
            ("postal_code", self.postal_code, POSTAL_CODE_MAX_LENGTH, &mut merged.postal_code),
            ("country", self.country, REGION_MAX_LENGTH, &mut merged.country),
            ("phone", self.phone, PHONE_MAX_LENGTH, &mut merged.phone),
        ];
        for (field, value, max_length, slot) in updates {
            let Some(value) = value else { continue };
            let value = value.trim().to_string();
            within_length(field, &value, max_length, &mut errors);
            *slot = value;
        }

        if errors.is_empty() {
            Ok(merged)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_supplied_fields_change() {
        let stored = Profile { city: "Pune".into(), phone: "999".into(), ..Profile::default() };
        let update = ProfileUpdate { address_line1: Some(" 1 MG Road ".into()), phone: Some(String::new()), ..ProfileUpdate::default() };
        let merged = update.merge_into(&stored).unwrap();
        assert_eq!(merged.address_line1, "1 MG Road");
        assert_eq!(merged.city, "Pune");
        assert_eq!(merged.phone, "");
    }

    #[test]
    fn overlong_fields_are_reported_per_field() {
        let update = ProfileUpdate {
            postal_code: Some("1".repeat(21)),
            city: Some("c".repeat(101)),
            state: Some("s".repeat(100)),
            ..ProfileUpdate::default()
        };
        let errors = update.merge_into(&Profile::default()).unwrap_err();
        assert_eq!(errors.get("postal_code").unwrap(), &vec!["Ensure this field has no more than 20 characters.".to_string()]);
        assert!(errors.has("city"));
        assert!(!errors.has("state"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let update: ProfileUpdate = serde_json::from_str(r#"{"city": "Pune", "favourite_colour": "teal"}"#).unwrap();
        assert_eq!(update.merge_into(&Profile::default()).unwrap().city, "Pune");
    }
}
