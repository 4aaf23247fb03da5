use rand::Rng;

/// Generates a random token made of upper and lower case ASCII letters.
/// Used for session keys, CSRF tokens and password salts.
pub fn generate_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut token = String::with_capacity(length);
    for _ in 0..length {
        let random_char = if rng.gen::<bool>() {
            rng.gen_range(65..=90) as u8 as char
        } else {
            rng.gen_range(97..=122) as u8 as char
        };
        token.push(random_char);
    }

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_alphabetic_and_sized() {
        let token = generate_token(64);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        assert_ne!(generate_token(64), generate_token(64));
    }
}
