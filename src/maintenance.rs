use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::rt::time;
use chrono::{DateTime, Utc};

use crate::database::{Storage, StoreError};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub sessions_purged: u64,
    pub subscriptions_expired: u64,
}

/// One pass: drops sessions past their expiry and marks lapsed subscriptions expired.
pub async fn run_once(database: &dyn Storage, now: DateTime<Utc>) -> Result<MaintenanceReport, StoreError> {
    Ok(MaintenanceReport {
        sessions_purged: database.delete_expired_sessions(now).await?,
        subscriptions_expired: database.expire_subscriptions(now).await?,
    })
}

pub fn spawn(database: Arc<dyn Storage>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            let started = Instant::now();
            match run_once(database.as_ref(), Utc::now()).await {
                Ok(report) if report != MaintenanceReport::default() => log::info!(
                    "Maintenance purged {} sessions and expired {} subscriptions",
                    report.sessions_purged, report.subscriptions_expired),
                Ok(_) => {}
                Err(e) => log::error!("Maintenance pass failed: {}", e),
            }
            // passes take longer as the tables grow and a slow one delays the next
            let elapsed = started.elapsed();
            if elapsed > every {
                log::warn!("Maintenance pass took {}ms, longer than its {}s interval",
                    elapsed.as_millis(), every.as_secs());
            }
        }
    });
}
