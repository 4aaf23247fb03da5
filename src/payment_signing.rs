use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the signature the gateway attaches to a successful checkout:
/// hex(HMAC-SHA256(key_secret, "{order_id}|{payment_id}")).
pub fn payment_signature(key_secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes())
        .expect("HMAC can take a key of any size");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a checkout callback signature in constant time.
pub fn verify_payment_signature(key_secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let expected = payment_signature(key_secret, order_id, payment_id);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
