use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::database::DatabasePool;
use crate::database::queries;
use crate::handlers::admin::is_admin;
use crate::handlers::{BotDialogue, DialogueState, HandlerResult, ui};
use crate::subscription::{ChannelMode, JoinRequestLedger};

pub const CB_OP_ADD: &str = "op_add";
pub const CB_OP_DEL: &str = "op_del:";
pub const CB_TASK_ADD: &str = "task_add";
pub const CB_TASK_DEL: &str = "task_del:";

pub async fn admin_panel_text_handler(bot: Bot, msg: Message) -> HandlerResult {
    if !is_admin(&msg) {
        bot.send_message(msg.chat.id, "This option is for admins only.")
            .await?;
        return Ok(());
    }
    bot.send_message(msg.chat.id, "👨‍💼 Admin panel")
        .reply_markup(ui::admin_keyboard())
        .await?;
    Ok(())
}

pub async fn admin_button_handler(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    db_pool: Arc<DatabasePool>,
    ledger: Arc<JoinRequestLedger>,
    text: &str,
) -> HandlerResult {
    if !is_admin(&msg) {
        bot.send_message(msg.chat.id, "This option is for admins only.")
            .await?;
        return Ok(());
    }
    match text {
        ui::BTN_ADMIN_STATS => stats(bot, msg, db_pool, ledger).await,
        ui::BTN_ADMIN_OP_CHANNELS => op_channels_overview(bot, msg, db_pool).await,
        ui::BTN_ADMIN_TASK_CHANNELS => task_channels_overview(bot, msg, db_pool).await,
        ui::BTN_ADMIN_CREATE_PROMO => {
            bot.send_message(
                msg.chat.id,
                "🎁 Send: <code> <reward> <uses>\nUse * as the code to generate one.\n/cancel to abort.",
            )
            .await?;
            dialogue.update(DialogueState::AwaitingPromoDetails).await?;
            Ok(())
        }
        ui::BTN_ADMIN_REF_REWARD => {
            let current = queries::referral_reward(&db_pool).await?;
            bot.send_message(
                msg.chat.id,
                format!(
                    "💰 Current referral reward: {} ⭐️\nSend the new value (or /cancel).",
                    current
                ),
            )
            .await?;
            dialogue
                .update(DialogueState::AwaitingReferralReward)
                .await?;
            Ok(())
        }
        ui::BTN_ADMIN_BROADCAST => {
            crate::handlers::broadcast::start_broadcast(bot, dialogue, msg).await
        }
        _ => Ok(()),
    }
}

async fn stats(
    bot: Bot,
    msg: Message,
    db_pool: Arc<DatabasePool>,
    ledger: Arc<JoinRequestLedger>,
) -> HandlerResult {
    match queries::stats(&db_pool).await {
        Ok(stats) => {
            let response = format!(
                "📊 Statistics\n\n\
                 👥 Users: {}\n\
                 ⭐️ Stars in circulation: {:.1}\n\
                 📢 Required channels: {}\n\
                 📝 Task channels: {}\n\
                 🎁 Live promo codes: {}\n\
                 📨 Pending join requests: {} (in {} channels)",
                stats.total_users,
                stats.total_balance,
                stats.active_op_channels,
                stats.active_task_channels,
                stats.promo_codes,
                ledger.live_requests().await,
                ledger.channel_count().await,
            );
            bot.send_message(msg.chat.id, response).await?;
        }
        Err(e) => {
            log::error!("stats query failed: {}", e);
            bot.send_message(msg.chat.id, "Failed to retrieve statistics.")
                .await?;
        }
    }
    Ok(())
}

async fn op_channels_overview(bot: Bot, msg: Message, db_pool: Arc<DatabasePool>) -> HandlerResult {
    let channels = queries::active_op_channels(&db_pool).await?;
    let mut rows: Vec<Vec<InlineKeyboardButton>> = channels
        .iter()
        .map(|c| {
            let mode = match c.mode {
                ChannelMode::Subscribe => "subscribe",
                ChannelMode::JoinRequest => "request",
            };
            vec![InlineKeyboardButton::callback(
                format!("🗑 {} ({})", c.name, mode),
                format!("{}{}", CB_OP_DEL, c.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("➕ Add", CB_OP_ADD)]);

    bot.send_message(
        msg.chat.id,
        format!(
            "📢 Required channels: {}\nTap a channel to remove it.",
            channels.len()
        ),
    )
    .reply_markup(InlineKeyboardMarkup::new(rows))
    .await?;
    Ok(())
}

async fn task_channels_overview(
    bot: Bot,
    msg: Message,
    db_pool: Arc<DatabasePool>,
) -> HandlerResult {
    let channels = queries::active_task_channels(&db_pool).await?;
    let mut rows: Vec<Vec<InlineKeyboardButton>> = channels
        .iter()
        .map(|c| {
            vec![InlineKeyboardButton::callback(
                format!("🗑 {} ({} ⭐️, {} left)", c.name, c.reward, c.join_limit),
                format!("{}{}", CB_TASK_DEL, c.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("➕ Add", CB_TASK_ADD)]);

    bot.send_message(
        msg.chat.id,
        format!(
            "📝 Task channels: {}\nTap a channel to remove it.",
            channels.len()
        ),
    )
    .reply_markup(InlineKeyboardMarkup::new(rows))
    .await?;
    Ok(())
}

pub async fn receive_op_channel(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db_pool: Arc<DatabasePool>,
) -> HandlerResult {
    if !is_admin(&msg) {
        dialogue.exit().await?;
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text == "/cancel" {
        bot.send_message(msg.chat.id, "❌ Cancelled.").await?;
        dialogue.exit().await?;
        return Ok(());
    }

    match parse_channel_line(text) {
        Some((channel_id, name, url, mode)) => {
            queries::add_op_channel(&db_pool, channel_id, name.clone(), url, mode).await?;
            bot.send_message(msg.chat.id, format!("✅ Channel «{}» added.", name))
                .await?;
            dialogue.exit().await?;
        }
        None => {
            bot.send_message(
                msg.chat.id,
                "Format: <channel_id>, <name>, <url>[, request]\n\
                 Example: -1001234567890, News, https://t.me/+abc, request",
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn receive_task_channel(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db_pool: Arc<DatabasePool>,
) -> HandlerResult {
    if !is_admin(&msg) {
        dialogue.exit().await?;
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text == "/cancel" {
        bot.send_message(msg.chat.id, "❌ Cancelled.").await?;
        dialogue.exit().await?;
        return Ok(());
    }

    match parse_task_line(text) {
        Some((channel_id, name, url, reward, join_limit, mode)) => {
            queries::add_task_channel(&db_pool, channel_id, name.clone(), url, reward, join_limit, mode)
                .await?;
            bot.send_message(msg.chat.id, format!("✅ Task «{}» added.", name))
                .await?;
            dialogue.exit().await?;
        }
        None => {
            bot.send_message(
                msg.chat.id,
                "Format: <channel_id>, <name>, <url>, <reward>[, limit][, request]\n\
                 Example: -1001234567890, Club, https://t.me/+abc, 5, 100, request",
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn receive_referral_reward(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db_pool: Arc<DatabasePool>,
) -> HandlerResult {
    if !is_admin(&msg) {
        dialogue.exit().await?;
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text == "/cancel" {
        bot.send_message(msg.chat.id, "❌ Cancelled.").await?;
        dialogue.exit().await?;
        return Ok(());
    }
    match text.trim().parse::<f64>() {
        Ok(reward) if reward > 0.0 => {
            queries::set_referral_reward(&db_pool, reward).await?;
            bot.send_message(
                msg.chat.id,
                format!("✅ Referral reward set to {} ⭐️.", reward),
            )
            .await?;
            dialogue.exit().await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Send a positive number, e.g. 3 or 2.5.")
                .await?;
        }
    }
    Ok(())
}

pub async fn receive_promo_details(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db_pool: Arc<DatabasePool>,
) -> HandlerResult {
    if !is_admin(&msg) {
        dialogue.exit().await?;
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text == "/cancel" {
        bot.send_message(msg.chat.id, "❌ Cancelled.").await?;
        dialogue.exit().await?;
        return Ok(());
    }

    let Some((code, reward, uses)) = parse_promo_line(text) else {
        bot.send_message(msg.chat.id, "Format: <code> <reward> <uses>\nExample: STARS10 10 50")
            .await?;
        return Ok(());
    };

    if queries::create_promo(&db_pool, code.clone(), reward, uses).await? {
        bot.send_message(
            msg.chat.id,
            format!("✅ Promo {} created: {} ⭐️, {} activations.", code, reward, uses),
        )
        .await?;
        dialogue.exit().await?;
    } else {
        bot.send_message(msg.chat.id, "❌ This code already exists.")
            .await?;
    }
    Ok(())
}

fn parse_channel_line(text: &str) -> Option<(i64, String, String, ChannelMode)> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }
    let channel_id: i64 = parts[0].parse().ok()?;
    let mode = if parts.get(3).is_some_and(|p| p.eq_ignore_ascii_case("request")) {
        ChannelMode::JoinRequest
    } else {
        ChannelMode::Subscribe
    };
    Some((channel_id, parts[1].to_string(), parts[2].to_string(), mode))
}

fn parse_task_line(text: &str) -> Option<(i64, String, String, f64, i64, ChannelMode)> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        return None;
    }
    let channel_id: i64 = parts[0].parse().ok()?;
    let reward: f64 = parts[3].parse().ok()?;
    let mut join_limit = 10_000;
    let mut mode = ChannelMode::Subscribe;
    for extra in &parts[4..] {
        if extra.eq_ignore_ascii_case("request") {
            mode = ChannelMode::JoinRequest;
        } else if let Ok(limit) = extra.parse() {
            join_limit = limit;
        }
    }
    Some((
        channel_id,
        parts[1].to_string(),
        parts[2].to_string(),
        reward,
        join_limit,
        mode,
    ))
}

fn parse_promo_line(text: &str) -> Option<(String, f64, i64)> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }
    let reward: f64 = parts[1].parse().ok()?;
    let uses: i64 = parts[2].parse().ok()?;
    if reward <= 0.0 || uses <= 0 {
        return None;
    }
    let code = if parts[0] == "*" {
        generate_promo_code()
    } else {
        parts[0].to_uppercase()
    };
    Some((code, reward, uses))
}

fn generate_promo_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_line_with_and_without_mode() {
        let (id, name, url, mode) =
            parse_channel_line("-100123, News, https://t.me/news").unwrap();
        assert_eq!(id, -100123);
        assert_eq!(name, "News");
        assert_eq!(url, "https://t.me/news");
        assert_eq!(mode, ChannelMode::Subscribe);

        let (_, _, _, mode) =
            parse_channel_line("-100123, Club, https://t.me/+abc, request").unwrap();
        assert_eq!(mode, ChannelMode::JoinRequest);

        assert!(parse_channel_line("garbage").is_none());
        assert!(parse_channel_line("abc, Name, url").is_none());
    }

    #[test]
    fn parse_task_line_optional_fields() {
        let (id, name, _, reward, limit, mode) =
            parse_task_line("-1, One, https://t.me/one, 5").unwrap();
        assert_eq!((id, reward, limit, mode), (-1, 5.0, 10_000, ChannelMode::Subscribe));
        assert_eq!(name, "One");

        let (_, _, _, reward, limit, mode) =
            parse_task_line("-1, Two, https://t.me/two, 7.5, 100, request").unwrap();
        assert_eq!((reward, limit, mode), (7.5, 100, ChannelMode::JoinRequest));

        assert!(parse_task_line("-1, Two, https://t.me/two").is_none());
        assert!(parse_task_line("-1, Two, https://t.me/two, cheap").is_none());
    }

    #[test]
    fn parse_promo_line_validates_and_generates() {
        let (code, reward, uses) = parse_promo_line("stars10 10 50").unwrap();
        assert_eq!((code.as_str(), reward, uses), ("STARS10", 10.0, 50));

        let (code, _, _) = parse_promo_line("* 5 10").unwrap();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));

        assert!(parse_promo_line("CODE 0 10").is_none());
        assert!(parse_promo_line("CODE 5 -1").is_none());
        assert!(parse_promo_line("CODE 5").is_none());
    }
}
