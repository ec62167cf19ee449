//! Background Sync Scheduler
//!
//! Triggers scheduler runs (workspace-shared mailboxes of every workspace)
//! at a configurable interval. Uses Tokio tasks for non-blocking background
//! execution.

use super::manager::SyncManager;
use super::models::RunContext;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Settings key holding the scheduler configuration
pub const SCHEDULER_SETTINGS_KEY: &str = "mail_sync_scheduler";

/// Scheduler configuration stored in settings table
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub last_run: Option<String>, // ISO 8601 timestamp
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 15,
            last_run: None,
        }
    }
}

/// Background scheduler for automatic sync runs
#[derive(Clone)]
pub struct BackgroundScheduler {
    sync_manager: SyncManager,
    config: Arc<RwLock<SchedulerConfig>>,
    running: Arc<AtomicBool>,
    task_handle: Arc<StdMutex<Option<JoinHandle<()>>>>,
}

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

fn validate_interval(interval_minutes: u64) -> Result<(), SchedulerError> {
    if !(1..=1440).contains(&interval_minutes) {
        return Err(SchedulerError::InvalidInterval(format!(
            "Interval must be 1-1440 minutes, got {}",
            interval_minutes
        )));
    }
    Ok(())
}

impl BackgroundScheduler {
    /// Create new scheduler instance
    pub fn new(sync_manager: SyncManager) -> Self {
        Self {
            sync_manager,
            config: Arc::new(RwLock::new(SchedulerConfig::default())),
            running: Arc::new(AtomicBool::new(false)),
            task_handle: Arc::new(StdMutex::new(None)),
        }
    }

    /// Load configuration from database settings table
    pub async fn load_config(&self) -> Result<(), SchedulerError> {
        let config: SchedulerConfig = self.sync_manager
            .db()
            .get_setting(SCHEDULER_SETTINGS_KEY)
            .map_err(|e| SchedulerError::Database(e.to_string()))?
            .unwrap_or_default();

        *self.config.write().await = config;
        Ok(())
    }

    /// Save configuration to database settings table
    pub async fn save_config(&self) -> Result<(), SchedulerError> {
        let config = self.config.read().await.clone();
        self.sync_manager
            .db()
            .set_setting(SCHEDULER_SETTINGS_KEY, &config)
            .map_err(|e| SchedulerError::Database(e.to_string()))?;
        Ok(())
    }

    /// Load the stored configuration and start when enabled
    pub async fn init(&self) -> Result<(), SchedulerError> {
        self.load_config().await?;

        if self.config.read().await.enabled {
            self.start().await?;
        } else {
            log::info!("Background scheduler disabled");
        }
        Ok(())
    }

    /// Start background scheduler task
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.load(Ordering::Relaxed) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let interval_minutes = self.config.read().await.interval_minutes;
        validate_interval(interval_minutes)?;

        self.running.store(true, Ordering::Relaxed);

        let running_clone = self.running.clone();
        let config_clone = self.config.clone();
        let manager_clone = self.sync_manager.clone();

        let handle = tokio::spawn(async move {
            Self::scheduler_loop(running_clone, config_clone, manager_clone).await;
        });

        match self.task_handle.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(e) => log::error!("Failed to store scheduler task handle: {}", e),
        }

        log::info!("Background scheduler started (interval: {} minutes)", interval_minutes);
        Ok(())
    }

    /// Stop background scheduler task
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(SchedulerError::NotRunning);
        }

        // Signals the loop to exit
        self.running.store(false, Ordering::Relaxed);

        if let Ok(mut slot) = self.task_handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }

        log::info!("Background scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current configuration
    pub async fn get_config(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    /// Update configuration and restart scheduler if needed
    pub async fn update_config(&self, enabled: bool, interval_minutes: u64) -> Result<(), SchedulerError> {
        validate_interval(interval_minutes)?;

        {
            let mut config = self.config.write().await;
            config.enabled = enabled;
            config.interval_minutes = interval_minutes;
        }

        self.save_config().await?;

        if self.is_running() {
            // Ignore error if not running (race condition)
            let _ = self.stop().await;
        }

        if enabled {
            self.start().await?;
        }

        log::info!("Scheduler config updated: enabled={}, interval={} minutes", enabled, interval_minutes);
        Ok(())
    }

    /// Background scheduler loop (runs in spawned task)
    async fn scheduler_loop(
        running: Arc<AtomicBool>,
        config: Arc<RwLock<SchedulerConfig>>,
        sync_manager: SyncManager,
    ) {
        let interval_minutes = config.read().await.interval_minutes;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60 * interval_minutes));

        log::info!("Scheduler loop started (interval: {} minutes)", interval_minutes);

        loop {
            interval.tick().await;

            if !running.load(Ordering::Relaxed) {
                log::info!("Scheduler loop: stopping (running flag is false)");
                break;
            }

            log::info!("Background mail sync triggered by scheduler");

            match sync_manager.run(&RunContext::scheduler()).await {
                Ok(result) => {
                    log::info!(
                        "Background mail sync completed: synced={}, connections={}, errors={}",
                        result.synced,
                        result.connections,
                        result.errors.len()
                    );

                    if !result.errors.is_empty() {
                        log::warn!("Background mail sync had {} errors: {:?}", result.errors.len(), result.errors);
                    }

                    let mut cfg = config.write().await;
                    cfg.last_run = Some(Utc::now().to_rfc3339());
                    let snapshot = cfg.clone();
                    drop(cfg);

                    if let Err(e) = sync_manager.db().set_setting(SCHEDULER_SETTINGS_KEY, &snapshot) {
                        log::error!("Failed to save last_run timestamp: {}", e);
                    }
                }
                Err(e) => {
                    // Retried on the next tick
                    log::error!("Background mail sync failed: {}", e);
                }
            }
        }

        log::info!("Scheduler loop exited");
    }
}

// ============================================================================
// Tests
// ============================================================================
