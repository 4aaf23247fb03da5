use crate::error::FieldErrors;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

pub fn too_long(max_length: usize) -> String {
    format!("Ensure this field has no more than {} characters.", max_length)
}

/// Returns the value when it is present and not blank, recording the problem otherwise.
pub fn required(field: &str, value: Option<String>, errors: &mut FieldErrors) -> Option<String> {
    match value {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some(value) if value.trim().is_empty() => {
            errors.add(field, BLANK);
            None
        }
        Some(value) => Some(value),
    }
}

/// Records an error when the value is longer than `max_length` characters.
pub fn within_length(field: &str, value: &str, max_length: usize, errors: &mut FieldErrors) {
    if value.chars().count() > max_length {
        errors.add(field, too_long(max_length));
    }
}
