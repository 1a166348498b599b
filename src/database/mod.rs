use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tokio::time::{Duration, timeout};

pub mod queries;

const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

pub fn get_database_path() -> PathBuf {
    std::env::var("DATABASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("starsbot.db"))
}

/// Creates the schema. Called once at startup, before the pool is used.
pub fn init_database(path: &PathBuf) -> Result<()> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {:?}", path))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            telegram_id INTEGER NOT NULL UNIQUE,
            username TEXT,
            referred_by INTEGER,
            balance REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_active TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_users_referred_by ON users(referred_by);

        -- Channels every user must join before the bot unlocks the menu.
        CREATE TABLE IF NOT EXISTS op_channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            mode INTEGER NOT NULL DEFAULT 0, -- 0 = subscribe, 1 = join request
            is_active INTEGER NOT NULL DEFAULT 1
        );

        -- Channels offered as rewarded tasks.
        CREATE TABLE IF NOT EXISTS task_channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            reward REAL NOT NULL,
            join_limit INTEGER NOT NULL DEFAULT 10000,
            mode INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS user_tasks (
            user_id INTEGER NOT NULL,
            task_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, task_id)
        );

        CREATE TABLE IF NOT EXISTS promo_codes (
            code TEXT PRIMARY KEY,
            reward REAL NOT NULL,
            uses_left INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS promo_redemptions (
            code TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (code, user_id)
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
    .context("failed to create database schema")?;
    Ok(())
}

/// Bounded access to the SQLite file: at most `max_connections` blocking
/// operations in flight, each opened on a blocking thread and capped by
/// [`OPERATION_TIMEOUT`].
pub struct DatabasePool {
    path: PathBuf,
    permits: Arc<Semaphore>,
}

impl DatabasePool {
    pub fn new(path: PathBuf, max_connections: usize) -> Self {
        Self {
            path,
            permits: Arc::new(Semaphore::new(max_connections)),
        }
    }

    pub async fn execute_with_timeout<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("database pool closed")?;
        let path = self.path.clone();
        let task = tokio::task::spawn_blocking(move || -> rusqlite::Result<T> {
            let mut conn = Connection::open(path)?;
            conn.busy_timeout(std::time::Duration::from_secs(3))?;
            f(&mut conn)
        });
        let joined = timeout(OPERATION_TIMEOUT, task)
            .await
            .context("database operation timed out")?;
        let result = joined.context("database task panicked")?;
        Ok(result?)
    }
}
