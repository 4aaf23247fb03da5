use serde::Serialize;

/// What the browser checkout needs to open the gateway's payment window.
#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub razorpay_key: String,
    pub user_name: String,
    pub user_email: String,
}
