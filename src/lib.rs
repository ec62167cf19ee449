//! # Pipeline Mail Sync
//!
//! Mailbox synchronization engine for the CRM sales pipeline. Pulls recent
//! messages from connected Gmail mailboxes, keeps the ones exchanged with
//! pipeline contacts and companies, and stores them against those entities.

pub mod config;
pub mod db;
pub mod mail;
pub mod oauth;
pub mod server;
pub mod sync;

use config::AppConfig;
use db::Database;
use std::sync::Arc;
use sync::{BackgroundScheduler, SyncManager};

// ============================================================================
// Application Entry Point
// ============================================================================

pub fn run() {
    // Load .env file for OAuth credentials and the scheduler key
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            eprintln!("FATAL: Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(data_dir) = config.database_path.parent() {
        if let Err(e) = std::fs::create_dir_all(data_dir) {
            log::error!("Failed to create data directory: {}", e);
            eprintln!("FATAL: Failed to create data directory at {:?}: {}", data_dir, e);
            std::process::exit(1);
        }
    }

    log::info!("Database path: {:?}", config.database_path);

    let db = match Database::new(config.database_path.clone()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            eprintln!("FATAL: Database initialization failed: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Database initialized successfully");

    for (category, client) in [("personal", &config.oauth.personal), ("workspace", &config.oauth.workspace)] {
        if client.is_none() {
            log::warn!("No OAuth client configured for {} mailboxes; expired tokens will not be refreshed", category);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            eprintln!("FATAL: Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let manager = match SyncManager::new(db, &config) {
        Ok(manager) => manager,
        Err(e) => {
            log::error!("Failed to initialize sync manager: {}", e);
            eprintln!("FATAL: Sync manager initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let scheduler = BackgroundScheduler::new(manager.clone());
    if let Err(e) = runtime.block_on(scheduler.init()) {
        // Manual runs through the server still work
        log::error!("Failed to start background scheduler: {}", e);
    }

    let server = match server::start(config.listen_addr, manager, runtime.handle().clone()) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Failed to start sync server: {}", e);
            eprintln!("FATAL: {}", e);
            std::process::exit(1);
        }
    };

    server.join();
}
