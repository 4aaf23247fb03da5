use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, MySql, Pool, Row};
use sqlx::mysql::{MySqlPoolOptions, MySqlQueryResult, MySqlRow};

use crate::data_structs::payment_order::PaymentOrder;
use crate::data_structs::profile::Profile;
use crate::data_structs::subscription::{NewSubscription, Subscription, SubscriptionStatus};
use crate::data_structs::user::{NewUser, User, UserCredentials};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a record with this {0} already exists")]
    Duplicate(&'static str),

    #[error("no {0} record found")]
    Missing(&'static str),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Everything the request handlers persist. Implemented by the MySQL pool and by the
/// in-memory store used for local runs and tests.
#[async_trait]
pub trait Storage: Send + Sync {

    /// Inserts the user and its empty profile together; nothing is written if either fails.
    /// A clash on username or email comes back as `StoreError::Duplicate`.
    async fn create_user_with_profile(&self, new_user: &NewUser) -> Result<User, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn get_user_credentials(&self, username: &str) -> Result<Option<UserCredentials>, StoreError>;

    async fn set_staff(&self, user_id: i64, is_staff: bool) -> Result<(), StoreError>;

    /// Returns the user's profile, creating an empty one first if there is none.
    async fn get_or_create_profile(&self, user_id: i64) -> Result<Profile, StoreError>;

    async fn save_profile(&self, user_id: i64, profile: &Profile) -> Result<(), StoreError>;

    async fn create_session(&self, session_token: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// The user behind an unexpired session token.
    async fn find_session_user(&self, session_token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError>;

    async fn delete_session(&self, session_token: &str) -> Result<(), StoreError>;

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// A clash on the gateway order id comes back as `StoreError::Duplicate("gateway_order_id")`.
    async fn create_subscription(&self, new_subscription: &NewSubscription) -> Result<Subscription, StoreError>;

    /// Newest first.
    async fn get_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError>;

    async fn find_subscription_by_order(&self, gateway_order_id: &str) -> Result<Option<Subscription>, StoreError>;

    /// Marks active subscriptions whose end date has passed as expired.
    async fn expire_subscriptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn create_payment_order(&self, order: &PaymentOrder) -> Result<(), StoreError>;

    async fn get_payment_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, StoreError>;

    async fn mark_payment_order_paid(&self, order_id: &str, payment_id: &str, paid_at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug)]
#[derive(Clone)]
pub struct DatabasePool {
    pool: Pool<MySql>,
}

impl DatabasePool {

    pub async fn new(host: &str, port: u16, user: &str, pass: &str, database: &str,
                     max_connections: u32) -> Result<Self, StoreError> {
        let connection_url = format!("mysql://{user}:{pass}@{host}:{port}/{database}");

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&connection_url).await?;

        Ok(DatabasePool { pool })
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        self.create_tables().await
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        self.create_user_table().await?;
        self.create_user_profile_table().await?;
        self.create_user_session_table().await?;
        self.create_subscription_table().await?;
        self.create_payment_order_table().await?;
        Ok(())
    }

    async fn create_user_table(&self) -> Result<MySqlQueryResult, sqlx::Error> {
        self.pool.execute(r#"
        create table if not exists users (
            id              bigint auto_increment                        not null,
            username        varchar(150)                                 not null,
            email           varchar(254)                                 not null,
            password_hash   varchar(128)                                 not null,
            first_name      varchar(150)                                 not null default '',
            last_name       varchar(150)                                 not null default '',
            is_staff        tinyint(1)                                   not null default 0,
            date_joined     datetime(6)                                  not null,
            PRIMARY KEY (id),
            UNIQUE KEY users_username (username),
            UNIQUE KEY users_email (email)
        );
        "#).await
    }

    async fn create_user_profile_table(&self) -> Result<MySqlQueryResult, sqlx::Error> {
        self.pool.execute(r#"
        create table if not exists user_profiles (
            user_id         bigint                                       not null,
            address_line1   varchar(255)                                 not null default '',
            address_line2   varchar(255)                                 not null default '',
            city            varchar(100)                                 not null default '',
            state           varchar(100)                                 not null default '',
            postal_code     varchar(20)                                  not null default '',
            country         varchar(100)                                 not null default '',
            phone           varchar(20)                                  not null default '',
            PRIMARY KEY (user_id),
            FOREIGN KEY (user_id) REFERENCES users (id)
        );
        "#).await
    }

    async fn create_user_session_table(&self) -> Result<MySqlQueryResult, sqlx::Error> {
        self.pool.execute(r#"
        create table if not exists user_sessions (
            session_token   char(64)                                     not null,
            user_id         bigint                                       not null,
            created_at      datetime(6)                                  not null,
            expires_at      datetime(6)                                  not null,
            PRIMARY KEY (session_token),
            KEY user_sessions_expiry (expires_at),
            FOREIGN KEY (user_id) REFERENCES users (id)
        );
        "#).await
    }

    async fn create_subscription_table(&self) -> Result<MySqlQueryResult, sqlx::Error> {
        self.pool.execute(r#"
        create table if not exists subscriptions (
            id                  bigint auto_increment                                               not null,
            user_id             bigint                                                              not null,
            duration            enum('1_month', '3_months', '6_months', '9_months', '12_months')   not null,
            price               bigint                                                              not null,
            start_date          datetime(6)                                                         not null,
            end_date            datetime(6)                                                         not null,
            status              enum('active', 'expired', 'cancelled') default 'active'            not null,
            created_at          datetime(6)                                                         not null,
            gateway_order_id    varchar(64)                                                         null,
            gateway_payment_id  varchar(64)                                                         null,
            PRIMARY KEY (id),
            UNIQUE KEY subscriptions_gateway_order (gateway_order_id),
            KEY subscriptions_status_end (status, end_date),
            FOREIGN KEY (user_id) REFERENCES users (id)
        );
        "#).await
    }

    async fn create_payment_order_table(&self) -> Result<MySqlQueryResult, sqlx::Error> {
        self.pool.execute(r#"
        create table if not exists payment_orders (
            order_id        varchar(64)                                                         not null,
            user_id         bigint                                                              not null,
            duration        enum('1_month', '3_months', '6_months', '9_months', '12_months')   not null,
            amount          bigint                                                              not null,
            currency        char(3)                                                             not null,
            paid            tinyint(1)                                                          not null default 0,
            payment_id      varchar(64)                                                         null,
            created_at      datetime(6)                                                         not null,
            paid_at         datetime(6)                                                         null,
            PRIMARY KEY (order_id),
            FOREIGN KEY (user_id) REFERENCES users (id)
        );
        "#).await
    }
}

/// Maps a failed insert onto the unique key it violated, when there is one.
fn classify_insert_error(error: sqlx::Error, unique_keys: &[(&str, &'static str)]) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            if let Some(violated) = violated_key(db_error.message()) {
                for (key_name, field) in unique_keys {
                    if violated == *key_name {
                        return StoreError::Duplicate(field);
                    }
                }
            }
        }
    }
    StoreError::Database(error)
}

/// The key name in "Duplicate entry '...' for key 'table.key'". The duplicated value can
/// contain anything, so only the trailing key clause is read.
fn violated_key(message: &str) -> Option<&str> {
    let (_, key) = message.rsplit_once("for key '")?;
    let key = key.strip_suffix('\'')?;
    Some(key.rsplit('.').next().unwrap_or(key))
}

fn decode_user(row: &MySqlRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_staff: row.try_get("is_staff")?,
        date_joined: row.try_get("date_joined")?,
    })
}

fn decode_profile(row: &MySqlRow) -> Result<Profile, sqlx::Error> {
    Ok(Profile {
        address_line1: row.try_get("address_line1")?,
        address_line2: row.try_get("address_line2")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        phone: row.try_get("phone")?,
    })
}

fn decode_subscription(row: &MySqlRow) -> Result<Subscription, sqlx::Error> {
    let duration: String = row.try_get("duration")?;
    let status: String = row.try_get("status")?;
    Ok(Subscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        duration: duration.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        price: row.try_get("price")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: status.parse::<SubscriptionStatus>().map_err(|e| sqlx::Error::Decode(e.into()))?,
        created_at: row.try_get("created_at")?,
        gateway_order_id: row.try_get("gateway_order_id")?,
        gateway_payment_id: row.try_get("gateway_payment_id")?,
    })
}

fn decode_payment_order(row: &MySqlRow) -> Result<PaymentOrder, sqlx::Error> {
    let duration: String = row.try_get("duration")?;
    Ok(PaymentOrder {
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        duration: duration.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        paid: row.try_get("paid")?,
        payment_id: row.try_get("payment_id")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

#[async_trait]
impl Storage for DatabasePool {

    async fn create_user_with_profile(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let date_joined = Utc::now();
        let mut transaction = self.pool.begin().await?;

        let result = sqlx::query(r#"
            INSERT INTO users
                (username, email, password_hash, first_name, last_name, is_staff, date_joined)
            VALUES (?, ?, ?, ?, ?, 0, ?)
        "#)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(date_joined)
            .execute(&mut *transaction).await
            .map_err(|e| classify_insert_error(e, &[("users_username", "username"), ("users_email", "email")]))?;

        let user_id = result.last_insert_id() as i64;

        sqlx::query("INSERT INTO user_profiles (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&mut *transaction).await?;

        transaction.commit().await?;

        Ok(User {
            id: user_id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            is_staff: false,
            date_joined,
        })
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username=?")
            .bind(username)
            .fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email=?")
            .bind(email)
            .fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id=?")
            .bind(user_id)
            .fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(decode_user).transpose()?)
    }

    async fn get_user_credentials(&self, username: &str) -> Result<Option<UserCredentials>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username=?")
            .bind(username)
            .fetch_optional(&self.pool).await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(UserCredentials {
                user: decode_user(&row)?,
                password_hash: row.try_get("password_hash")?,
            })),
        }
    }

    async fn set_staff(&self, user_id: i64, is_staff: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_staff=? WHERE id=?")
            .bind(is_staff)
            .bind(user_id)
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 && self.get_user(user_id).await?.is_none() {
            return Err(StoreError::Missing("user"));
        }
        Ok(())
    }

    async fn get_or_create_profile(&self, user_id: i64) -> Result<Profile, StoreError> {
        sqlx::query("INSERT IGNORE INTO user_profiles (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&self.pool).await?;

        let row = sqlx::query("SELECT * FROM user_profiles WHERE user_id=?")
            .bind(user_id)
            .fetch_one(&self.pool).await?;
        Ok(decode_profile(&row)?)
    }

    async fn save_profile(&self, user_id: i64, profile: &Profile) -> Result<(), StoreError> {
        sqlx::query(r#"
            INSERT INTO user_profiles
                (user_id, address_line1, address_line2, city, state, postal_code, country, phone)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                address_line1=VALUES(address_line1), address_line2=VALUES(address_line2),
                city=VALUES(city), state=VALUES(state), postal_code=VALUES(postal_code),
                country=VALUES(country), phone=VALUES(phone)
        "#)
            .bind(user_id)
            .bind(&profile.address_line1)
            .bind(&profile.address_line2)
            .bind(&profile.city)
            .bind(&profile.state)
            .bind(&profile.postal_code)
            .bind(&profile.country)
            .bind(&profile.phone)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn create_session(&self, session_token: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO user_sessions (session_token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(session_token)
            .bind(user_id)
            .bind(Utc::now())
            .bind(expires_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn find_session_user(&self, session_token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(r#"
            SELECT users.* FROM user_sessions
            JOIN users ON users.id = user_sessions.user_id
            WHERE user_sessions.session_token=? AND user_sessions.expires_at > ?
        "#)
            .bind(session_token)
            .bind(now)
            .fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(decode_user).transpose()?)
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_sessions WHERE session_token=?")
            .bind(session_token)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn create_subscription(&self, new_subscription: &NewSubscription) -> Result<Subscription, StoreError> {
        let created_at = new_subscription.start_date;
        let result = sqlx::query(r#"
            INSERT INTO subscriptions
                (user_id, duration, price, start_date, end_date, status, created_at,
                gateway_order_id, gateway_payment_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#)
            .bind(new_subscription.user_id)
            .bind(new_subscription.duration.as_str())
            .bind(new_subscription.price)
            .bind(new_subscription.start_date)
            .bind(new_subscription.end_date)
            .bind(SubscriptionStatus::Active.as_str())
            .bind(created_at)
            .bind(&new_subscription.gateway_order_id)
            .bind(&new_subscription.gateway_payment_id)
            .execute(&self.pool).await
            .map_err(|e| classify_insert_error(e, &[("subscriptions_gateway_order", "gateway_order_id")]))?;

        Ok(Subscription {
            id: result.last_insert_id() as i64,
            user_id: new_subscription.user_id,
            duration: new_subscription.duration,
            price: new_subscription.price,
            start_date: new_subscription.start_date,
            end_date: new_subscription.end_date,
            status: SubscriptionStatus::Active,
            created_at,
            gateway_order_id: new_subscription.gateway_order_id.clone(),
            gateway_payment_id: new_subscription.gateway_payment_id.clone(),
        })
    }

    async fn get_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query("SELECT * FROM subscriptions WHERE user_id=? ORDER BY created_at DESC, id DESC")
            .bind(user_id)
            .fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_subscription).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_subscription_by_order(&self, gateway_order_id: &str) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE gateway_order_id=?")
            .bind(gateway_order_id)
            .fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(decode_subscription).transpose()?)
    }

    async fn expire_subscriptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET status='expired' WHERE status='active' AND end_date <= ?")
            .bind(now)
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn create_payment_order(&self, order: &PaymentOrder) -> Result<(), StoreError> {
        sqlx::query(r#"
            INSERT INTO payment_orders
                (order_id, user_id, duration, amount, currency, paid, payment_id, created_at, paid_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#)
            .bind(&order.order_id)
            .bind(order.user_id)
            .bind(order.duration.as_str())
            .bind(order.amount)
            .bind(&order.currency)
            .bind(order.paid)
            .bind(&order.payment_id)
            .bind(order.created_at)
            .bind(order.paid_at)
            .execute(&self.pool).await
            .map_err(|e| classify_insert_error(e, &[("PRIMARY", "order_id")]))?;
        Ok(())
    }

    async fn get_payment_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, StoreError> {
        let row = sqlx::query("SELECT * FROM payment_orders WHERE order_id=?")
            .bind(order_id)
            .fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(decode_payment_order).transpose()?)
    }

    async fn mark_payment_order_paid(&self, order_id: &str, payment_id: &str, paid_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE payment_orders SET paid=1, payment_id=?, paid_at=? WHERE order_id=?")
            .bind(payment_id)
            .bind(paid_at)
            .bind(order_id)
            .execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::violated_key;

    #[test]
    fn violated_key_reads_only_the_key_clause() {
        assert_eq!(violated_key("Duplicate entry 'alice' for key 'users.users_username'"), Some("users_username"));
        assert_eq!(violated_key("Duplicate entry 'a@x.com' for key 'users_email'"), Some("users_email"));
        assert_eq!(
            violated_key("Duplicate entry 'users_username@x.com' for key 'users.users_email'"),
            Some("users_email"),
        );
        assert_eq!(violated_key("Duplicate entry 'order_1' for key 'payment_orders.PRIMARY'"), Some("PRIMARY"));
        assert_eq!(violated_key("Deadlock found when trying to get lock"), None);
    }
}
