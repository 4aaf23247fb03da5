pub mod api;
pub mod config;
pub mod csrf;
pub mod database;
pub mod error;
pub mod maintenance;
pub mod memory_database;
pub mod password;
pub mod payment_signing;
pub mod razorpay_util;
pub mod session;
pub mod utils;
#[cfg(test)]
mod test_support;

pub mod data_structs {
    pub mod payment_order;
    pub mod profile;
    pub mod subscription;
    pub mod subscription_duration;
    pub mod user;

    pub mod requests {
        pub mod duration_request;
        pub mod field_checks;
        pub mod login_request;
        pub mod profile_update;
        pub mod register_request;
        pub mod verify_payment_request;
    }

    pub mod responses {
        pub mod message_response;
        pub mod payment_response;
        pub mod subscription_response;
        pub mod user_response;
    }
}

use std::num::NonZeroU32;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use crate::config::{AppConfig, ConfigError, StorageBackend};
use crate::database::{DatabasePool, Storage, StoreError};
use crate::memory_database::MemoryDatabase;
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::razorpay_util::{GatewayCredentials, GatewayError, PaymentGateway, RazorpayHandler, RetryPolicy};
use crate::session::SessionSettings;

#[derive(Clone)]
pub struct SharedResources {
    database: Arc<dyn Storage>,
    /// `None` when no gateway keys are configured; payment routes then answer 500.
    payment_gateway: Option<Arc<dyn PaymentGateway>>,
    password_policy: Arc<PasswordPolicy>,
    password_hasher: PasswordHasher,
    session_settings: SessionSettings,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database unavailable: {0}")]
    Storage(#[from] StoreError),

    #[error("payment gateway client: {0}")]
    Gateway(#[from] GatewayError),
}

/// Grants the staff capability to the configured accounts that exist.
async fn grant_staff(database: &dyn Storage, usernames: &[String]) -> Result<(), StoreError> {
    for username in usernames {
        match database.get_user_credentials(username).await? {
            Some(credentials) => {
                if !credentials.user.is_staff {
                    database.set_staff(credentials.user.id, true).await?;
                    log::info!("Granted staff to {}", username);
                }
            }
            None => log::warn!("Staff account {} does not exist yet", username),
        }
    }
    Ok(())
}

async fn load(config: &AppConfig) -> Result<SharedResources, StartupError> {
    let database: Arc<dyn Storage> = match config.storage {
        StorageBackend::Mysql => {
            log::info!("Connecting to the database...");
            let creds = config.mysql.as_ref().ok_or(ConfigError::MissingRequired("mysql"))?;
            let database = DatabasePool::new(&creds.host, creds.port, &creds.username, &creds.password,
                                             &creds.database, creds.max_connections).await?;
            database.init().await?;
            Arc::new(database)
        }
        StorageBackend::Memory => {
            log::warn!("Using the in-memory store, nothing will survive a restart");
            Arc::new(MemoryDatabase::new())
        }
    };
    grant_staff(database.as_ref(), &config.staff_usernames).await?;

    let razorpay = &config.razorpay;
    let payment_gateway: Option<Arc<dyn PaymentGateway>> = if razorpay.is_configured() {
        log::info!("Payments go through {}", razorpay.api_base_url);
        let handler = RazorpayHandler::new(
            GatewayCredentials { key_id: razorpay.key_id.clone(), key_secret: razorpay.key_secret.clone() },
            razorpay.currency.clone(),
            razorpay.api_base_url.clone(),
            razorpay.timeout,
            RetryPolicy { max_attempts: razorpay.max_retries + 1, initial_backoff: razorpay.initial_backoff },
        )?;
        Some(Arc::new(handler))
    } else {
        log::warn!("Razorpay keys are not configured, payment endpoints are disabled");
        None
    };

    let iterations = NonZeroU32::new(config.password.hash_iterations)
        .ok_or(ConfigError::MissingRequired("password.hash_iterations"))?;

    Ok(SharedResources {
        database,
        payment_gateway,
        password_policy: Arc::new(PasswordPolicy::standard(config.password.min_length)),
        password_hasher: PasswordHasher::new(iterations),
        session_settings: SessionSettings {
            ttl: config.session.ttl,
            secure_cookies: config.session.secure_cookies,
        },
    })
}

fn cors_for(allowed_origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-csrftoken"),
        ])
        .supports_credentials()
        .max_age(3600);
    allowed_origins.iter().fold(cors, |cors, origin| cors.allowed_origin(origin))
}

fn startup_failure(e: impl Into<StartupError>) -> std::io::Error {
    let e = e.into();
    log::error!("Startup failed: {}", e);
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yml".to_string());
    log::info!("Loading configuration from {}", config_path);
    let config = AppConfig::load(&config_path).map_err(startup_failure)?;
    let shared_resources = load(&config).await.map_err(startup_failure)?;

    log::info!("Starting maintenance task every {}s", config.maintenance_interval.as_secs());
    maintenance::spawn(shared_resources.database.clone(), config.maintenance_interval);

    let server = config.server.clone();
    log::info!("Starting HTTP server on {}:{}", server.host, server.port);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(shared_resources.clone()))
            .wrap_fn(csrf::guard)
            .wrap(cors_for(&server.allowed_origins))
            .wrap(Logger::new("%a \"%r\" %s %b \"%{User-Agent}i\" %T"))
            .configure(api::configure)
    })
        .bind((config.server.host.as_str(), config.server.port))?
        .run()
        .await
}
