//! Lifecycle triggers and background timers. Every trigger funnels into
//! [`LicenseManager::refresh`], so its rate limit covers them all.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::LicenseManager;
use crate::error::Result;
use crate::models::LicenseState;

impl LicenseManager {
    /// Process start.
    pub async fn on_startup(&self) -> Result<bool> {
        tracing::debug!(trigger = "startup", "Validation requested");
        self.refresh().await
    }

    /// The host window or process regained focus.
    pub async fn on_foreground(&self) -> Result<bool> {
        tracing::debug!(trigger = "foreground", "Validation requested");
        self.refresh().await
    }

    /// Ping the authority and update connectivity. Coming back online while
    /// running on offline grace triggers a refresh.
    pub async fn check_connectivity(&self) -> bool {
        let online = self.client.ping(self.config.ping_timeout()).await;
        let flipped = self.note_connectivity(online);

        if flipped
            && online
            && self.state() == LicenseState::OfflineGrace
            && let Err(e) = self.refresh().await
        {
            tracing::error!(error = %e, "Validation after reconnect failed");
        }
        online
    }

    /// Spawn the periodic validation timer and the connectivity ping loop.
    /// Must be called from within a Tokio runtime; [`super::dispose`] stops both.
    pub fn start_background(self: &Arc<Self>) {
        let validation = spawn_ticker(
            Arc::downgrade(self),
            self.config.validation_interval(),
            |manager| async move {
                if let Err(e) = manager.refresh().await {
                    tracing::error!(error = %e, "Scheduled validation failed");
                }
            },
        );

        let ping = spawn_ticker(
            Arc::downgrade(self),
            self.config.ping_interval(),
            |manager| async move {
                manager.check_connectivity().await;
            },
        );

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(validation);
            tasks.push(ping);
        }

        tracing::info!(
            validation_interval_hours = self.config.validation_interval_hours,
            ping_interval_secs = self.config.connectivity.ping_interval_secs,
            "Background license checks started"
        );
    }
}

/// Run `tick` every `period` until the manager is dropped. The immediate
/// first tick is skipped; startup has its own trigger.
fn spawn_ticker<F, Fut>(
    manager: Weak<LicenseManager>,
    period: Duration,
    tick: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(Arc<LicenseManager>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(manager) = manager.upgrade() else {
                break;
            };
            tick(manager).await;
        }
    })
}
