use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use super::DatabasePool;
use crate::subscription::{ChannelMode, Requirement};

const DEFAULT_REFERRAL_REWARD: f64 = 3.0;

fn mode_from_db(raw: i64) -> ChannelMode {
    if raw == 1 {
        ChannelMode::JoinRequest
    } else {
        ChannelMode::Subscribe
    }
}

fn mode_to_db(mode: ChannelMode) -> i64 {
    match mode {
        ChannelMode::Subscribe => 0,
        ChannelMode::JoinRequest => 1,
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub balance: f64,
    pub referred_by: Option<i64>,
    pub created_at: String,
}

/// A channel every user must join before the main menu unlocks.
#[derive(Debug, Clone)]
pub struct OpChannel {
    pub id: i64,
    pub channel_id: i64,
    pub name: String,
    pub url: String,
    pub mode: ChannelMode,
}

impl Requirement for OpChannel {
    fn channel_id(&self) -> i64 {
        self.channel_id
    }

    fn mode(&self) -> ChannelMode {
        self.mode
    }
}

/// A channel offered as a rewarded task.
#[derive(Debug, Clone)]
pub struct TaskChannel {
    pub id: i64,
    pub channel_id: i64,
    pub name: String,
    pub url: String,
    pub reward: f64,
    pub join_limit: i64,
    pub mode: ChannelMode,
}

impl Requirement for TaskChannel {
    fn channel_id(&self) -> i64 {
        self.channel_id
    }

    fn mode(&self) -> ChannelMode {
        self.mode
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    Redeemed(f64),
    AlreadyRedeemed,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub total_users: i64,
    pub total_balance: f64,
    pub active_op_channels: i64,
    pub active_task_channels: i64,
    pub promo_codes: i64,
}

/// Registers the user if unseen and refreshes activity either way. Returns
/// true when this was a first-time registration.
pub async fn register_user(
    pool: &DatabasePool,
    telegram_id: i64,
    username: Option<String>,
    referred_by: Option<i64>,
) -> Result<bool> {
    pool.execute_with_timeout(move |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO users (telegram_id, username, referred_by) VALUES (?1, ?2, ?3)",
            params![telegram_id, username, referred_by],
        )?;
        let inserted = conn.changes() > 0;
        conn.execute(
            "UPDATE users SET last_active = CURRENT_TIMESTAMP, username = COALESCE(?2, username)
             WHERE telegram_id = ?1",
            params![telegram_id, username],
        )?;
        Ok(inserted)
    })
    .await
}

pub async fn get_user(pool: &DatabasePool, telegram_id: i64) -> Result<Option<UserRow>> {
    pool.execute_with_timeout(move |conn| {
        conn.query_row(
            "SELECT telegram_id, username, balance, referred_by, created_at
             FROM users WHERE telegram_id = ?1",
            [telegram_id],
            |row| {
                Ok(UserRow {
                    telegram_id: row.get(0)?,
                    username: row.get(1)?,
                    balance: row.get(2)?,
                    referred_by: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
    })
    .await
}

pub async fn invite_count(pool: &DatabasePool, telegram_id: i64) -> Result<i64> {
    pool.execute_with_timeout(move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM users WHERE referred_by = ?1",
            [telegram_id],
            |row| row.get(0),
        )
    })
    .await
}

pub async fn add_balance(pool: &DatabasePool, telegram_id: i64, amount: f64) -> Result<()> {
    pool.execute_with_timeout(move |conn| {
        conn.execute(
            "UPDATE users SET balance = balance + ?1 WHERE telegram_id = ?2",
            params![amount, telegram_id],
        )?;
        Ok(())
    })
    .await
}

pub async fn all_user_ids(pool: &DatabasePool) -> Result<Vec<i64>> {
    pool.execute_with_timeout(|conn| {
        let mut stmt = conn.prepare("SELECT telegram_id FROM users")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        ids.collect()
    })
    .await
}

pub async fn referral_reward(pool: &DatabasePool) -> Result<f64> {
    pool.execute_with_timeout(|conn| {
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'referral_reward'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REFERRAL_REWARD))
    })
    .await
}

pub async fn set_referral_reward(pool: &DatabasePool, reward: f64) -> Result<()> {
    pool.execute_with_timeout(move |conn| {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES ('referral_reward', ?1)
             ON CONFLICT(key) DO UPDATE SET value = ?1",
            [reward.to_string()],
        )?;
        Ok(())
    })
    .await
}

pub async fn active_op_channels(pool: &DatabasePool) -> Result<Vec<OpChannel>> {
    pool.execute_with_timeout(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, channel_id, name, url, mode FROM op_channels
             WHERE is_active = 1 ORDER BY id",
        )?;
        let channels = stmt.query_map([], |row| {
            Ok(OpChannel {
                id: row.get(0)?,
                channel_id: row.get(1)?,
                name: row.get(2)?,
                url: row.get(3)?,
                mode: mode_from_db(row.get(4)?),
            })
        })?;
        channels.collect()
    })
    .await
}

pub async fn add_op_channel(
    pool: &DatabasePool,
    channel_id: i64,
    name: String,
    url: String,
    mode: ChannelMode,
) -> Result<()> {
    pool.execute_with_timeout(move |conn| {
        conn.execute(
            "INSERT INTO op_channels (channel_id, name, url, mode) VALUES (?1, ?2, ?3, ?4)",
            params![channel_id, name, url, mode_to_db(mode)],
        )?;
        Ok(())
    })
    .await
}

pub async fn remove_op_channel(pool: &DatabasePool, id: i64) -> Result<bool> {
    pool.execute_with_timeout(move |conn| {
        conn.execute("DELETE FROM op_channels WHERE id = ?1", [id])?;
        Ok(conn.changes() > 0)
    })
    .await
}

pub async fn active_task_channels(pool: &DatabasePool) -> Result<Vec<TaskChannel>> {
    pool.execute_with_timeout(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, channel_id, name, url, reward, join_limit, mode FROM task_channels
             WHERE is_active = 1 ORDER BY id",
        )?;
        let channels = stmt.query_map([], task_channel_from_row)?;
        channels.collect()
    })
    .await
}

fn task_channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskChannel> {
    Ok(TaskChannel {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        reward: row.get(4)?,
        join_limit: row.get(5)?,
        mode: mode_from_db(row.get(6)?),
    })
}

pub async fn add_task_channel(
    pool: &DatabasePool,
    channel_id: i64,
    name: String,
    url: String,
    reward: f64,
    join_limit: i64,
    mode: ChannelMode,
) -> Result<()> {
    pool.execute_with_timeout(move |conn| {
        conn.execute(
            "INSERT INTO task_channels (channel_id, name, url, reward, join_limit, mode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![channel_id, name, url, reward, join_limit, mode_to_db(mode)],
        )?;
        Ok(())
    })
    .await
}

pub async fn remove_task_channel(pool: &DatabasePool, id: i64) -> Result<bool> {
    pool.execute_with_timeout(move |conn| {
        conn.execute("DELETE FROM task_channels WHERE id = ?1", [id])?;
        Ok(conn.changes() > 0)
    })
    .await
}

pub async fn task_channel_by_id(pool: &DatabasePool, id: i64) -> Result<Option<TaskChannel>> {
    pool.execute_with_timeout(move |conn| {
        conn.query_row(
            "SELECT id, channel_id, name, url, reward, join_limit, mode FROM task_channels
             WHERE id = ?1",
            [id],
            task_channel_from_row,
        )
        .optional()
    })
    .await
}

/// The first active task with capacity left the user has not completed.
pub async fn next_task_for(pool: &DatabasePool, user_id: i64) -> Result<Option<TaskChannel>> {
    pool.execute_with_timeout(move |conn| {
        conn.query_row(
            "SELECT id, channel_id, name, url, reward, join_limit, mode FROM task_channels
             WHERE is_active = 1 AND join_limit > 0
               AND id NOT IN (SELECT task_id FROM user_tasks WHERE user_id = ?1 AND completed = 1)
             ORDER BY id LIMIT 1",
            [user_id],
            task_channel_from_row,
        )
        .optional()
    })
    .await
}

/// Marks the task completed and credits the reward, once. Returns false if
/// the user had already completed it.
pub async fn complete_task(pool: &DatabasePool, user_id: i64, task: &TaskChannel) -> Result<bool> {
    let task_id = task.id;
    let reward = task.reward;
    pool.execute_with_timeout(move |conn| {
        let tx = conn.transaction()?;
        let already: Option<i64> = tx
            .query_row(
                "SELECT completed FROM user_tasks WHERE user_id = ?1 AND task_id = ?2",
                params![user_id, task_id],
                |row| row.get(0),
            )
            .optional()?;
        if already == Some(1) {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO user_tasks (user_id, task_id, completed) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id, task_id) DO UPDATE SET completed = 1",
            params![user_id, task_id],
        )?;
        tx.execute(
            "UPDATE task_channels SET join_limit = join_limit - 1 WHERE id = ?1 AND join_limit > 0",
            [task_id],
        )?;
        tx.execute(
            "UPDATE users SET balance = balance + ?1 WHERE telegram_id = ?2",
            params![reward, user_id],
        )?;
        tx.commit()?;
        Ok(true)
    })
    .await
}

/// Returns false when the code already exists.
pub async fn create_promo(
    pool: &DatabasePool,
    code: String,
    reward: f64,
    uses: i64,
) -> Result<bool> {
    pool.execute_with_timeout(move |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO promo_codes (code, reward, uses_left) VALUES (?1, ?2, ?3)",
            params![code, reward, uses],
        )?;
        Ok(conn.changes() > 0)
    })
    .await
}

pub async fn redeem_promo(
    pool: &DatabasePool,
    code: String,
    user_id: i64,
) -> Result<RedeemOutcome> {
    pool.execute_with_timeout(move |conn| {
        let tx = conn.transaction()?;
        let promo: Option<(f64, i64)> = tx
            .query_row(
                "SELECT reward, uses_left FROM promo_codes WHERE code = ?1",
                [&code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((reward, uses_left)) = promo else {
            return Ok(RedeemOutcome::Invalid);
        };
        if uses_left <= 0 {
            return Ok(RedeemOutcome::Invalid);
        }
        let already: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM promo_redemptions WHERE code = ?1 AND user_id = ?2",
                params![code, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if already.is_some() {
            return Ok(RedeemOutcome::AlreadyRedeemed);
        }
        tx.execute(
            "INSERT INTO promo_redemptions (code, user_id) VALUES (?1, ?2)",
            params![code, user_id],
        )?;
        tx.execute(
            "UPDATE promo_codes SET uses_left = uses_left - 1 WHERE code = ?1",
            [&code],
        )?;
        tx.execute(
            "UPDATE users SET balance = balance + ?1 WHERE telegram_id = ?2",
            params![reward, user_id],
        )?;
        tx.commit()?;
        Ok(RedeemOutcome::Redeemed(reward))
    })
    .await
}

pub async fn stats(pool: &DatabasePool) -> Result<Stats> {
    pool.execute_with_timeout(|conn| {
        let total_users: i64 =
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let total_balance: f64 = conn.query_row(
            "SELECT COALESCE(SUM(balance), 0) FROM users",
            [],
            |row| row.get(0),
        )?;
        let active_op_channels: i64 = conn.query_row(
            "SELECT COUNT(*) FROM op_channels WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        let active_task_channels: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_channels WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        let promo_codes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM promo_codes WHERE uses_left > 0",
            [],
            |row| row.get(0),
        )?;
        Ok(Stats {
            total_users,
            total_balance,
            active_op_channels,
            active_task_channels,
            promo_codes,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_database;

    fn test_pool() -> (tempfile::TempDir, DatabasePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        init_database(&path).unwrap();
        (dir, DatabasePool::new(path, 2))
    }

    #[tokio::test]
    async fn register_user_is_idempotent() {
        let (_dir, pool) = test_pool();
        assert!(register_user(&pool, 1, Some("alice".into()), None).await.unwrap());
        assert!(!register_user(&pool, 1, Some("alice".into()), None).await.unwrap());
        let user = get_user(&pool, 1).await.unwrap().unwrap();
        assert_eq!(user.balance, 0.0);
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn referrals_are_counted() {
        let (_dir, pool) = test_pool();
        register_user(&pool, 1, None, None).await.unwrap();
        register_user(&pool, 2, None, Some(1)).await.unwrap();
        register_user(&pool, 3, None, Some(1)).await.unwrap();
        assert_eq!(invite_count(&pool, 1).await.unwrap(), 2);
        assert_eq!(invite_count(&pool, 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn promo_redemption_is_single_use_per_user_and_bounded() {
        let (_dir, pool) = test_pool();
        register_user(&pool, 1, None, None).await.unwrap();
        register_user(&pool, 2, None, None).await.unwrap();
        register_user(&pool, 3, None, None).await.unwrap();
        assert!(create_promo(&pool, "STARS10".into(), 10.0, 2).await.unwrap());
        assert!(!create_promo(&pool, "STARS10".into(), 99.0, 5).await.unwrap());

        assert_eq!(
            redeem_promo(&pool, "STARS10".into(), 1).await.unwrap(),
            RedeemOutcome::Redeemed(10.0)
        );
        assert_eq!(
            redeem_promo(&pool, "STARS10".into(), 1).await.unwrap(),
            RedeemOutcome::AlreadyRedeemed
        );
        assert_eq!(
            redeem_promo(&pool, "STARS10".into(), 2).await.unwrap(),
            RedeemOutcome::Redeemed(10.0)
        );
        // Two activations used up.
        assert_eq!(
            redeem_promo(&pool, "STARS10".into(), 3).await.unwrap(),
            RedeemOutcome::Invalid
        );
        assert_eq!(
            redeem_promo(&pool, "NOPE".into(), 1).await.unwrap(),
            RedeemOutcome::Invalid
        );
        let user = get_user(&pool, 1).await.unwrap().unwrap();
        assert_eq!(user.balance, 10.0);
    }

    #[tokio::test]
    async fn task_flow_credits_once_and_advances() {
        let (_dir, pool) = test_pool();
        register_user(&pool, 1, None, None).await.unwrap();
        add_task_channel(&pool, -100, "One".into(), "https://t.me/one".into(), 5.0, 1, ChannelMode::Subscribe)
            .await
            .unwrap();
        add_task_channel(&pool, -200, "Two".into(), "https://t.me/two".into(), 7.0, 10, ChannelMode::JoinRequest)
            .await
            .unwrap();

        let task = next_task_for(&pool, 1).await.unwrap().unwrap();
        assert_eq!(task.channel_id, -100);
        assert!(complete_task(&pool, 1, &task).await.unwrap());
        assert!(!complete_task(&pool, 1, &task).await.unwrap());

        let next = next_task_for(&pool, 1).await.unwrap().unwrap();
        assert_eq!(next.channel_id, -200);
        // First channel hit its limit, so a fresh user skips it too.
        register_user(&pool, 2, None, None).await.unwrap();
        assert_eq!(next_task_for(&pool, 2).await.unwrap().unwrap().channel_id, -200);

        let user = get_user(&pool, 1).await.unwrap().unwrap();
        assert_eq!(user.balance, 5.0);
    }

    #[tokio::test]
    async fn op_channel_round_trip() {
        let (_dir, pool) = test_pool();
        add_op_channel(&pool, -100, "News".into(), "https://t.me/news".into(), ChannelMode::Subscribe)
            .await
            .unwrap();
        add_op_channel(&pool, -200, "Club".into(), "https://t.me/club".into(), ChannelMode::JoinRequest)
            .await
            .unwrap();
        let channels = active_op_channels(&pool).await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].mode, ChannelMode::Subscribe);
        assert_eq!(channels[1].mode, ChannelMode::JoinRequest);

        assert!(remove_op_channel(&pool, channels[0].id).await.unwrap());
        assert!(!remove_op_channel(&pool, channels[0].id).await.unwrap());
        assert_eq!(active_op_channels(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn referral_reward_setting_round_trip() {
        let (_dir, pool) = test_pool();
        assert_eq!(referral_reward(&pool).await.unwrap(), DEFAULT_REFERRAL_REWARD);
        set_referral_reward(&pool, 5.5).await.unwrap();
        assert_eq!(referral_reward(&pool).await.unwrap(), 5.5);
    }
}
