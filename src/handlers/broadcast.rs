use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tokio::time::{Duration, sleep};

use crate::database::DatabasePool;
use crate::database::queries;
use crate::handlers::admin::is_admin;
use crate::handlers::{BotDialogue, DialogueState, HandlerResult};

pub const CB_BROADCAST_CONFIRM: &str = "broadcast_confirm";
pub const CB_BROADCAST_CANCEL: &str = "broadcast_cancel";

// Telegram allows ~30 msg/sec for bots; stay under it.
const MESSAGES_PER_SECOND: usize = 25;

pub async fn start_broadcast(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
    if !is_admin(&msg) {
        bot.send_message(msg.chat.id, "⛔ Admins only.").await?;
        return Ok(());
    }
    bot.send_message(
        msg.chat.id,
        "📣 Send the broadcast message (HTML supported).\n/cancel to abort.",
    )
    .await?;
    dialogue
        .update(DialogueState::AwaitingBroadcastMessage)
        .await?;
    Ok(())
}

pub async fn receive_broadcast_message(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text == "/cancel" {
        bot.send_message(msg.chat.id, "❌ Cancelled.").await?;
        dialogue.exit().await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, "📝 Preview:").await?;
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;

    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Send to all", CB_BROADCAST_CONFIRM),
        InlineKeyboardButton::callback("❌ Cancel", CB_BROADCAST_CANCEL),
    ]]);
    bot.send_message(msg.chat.id, "Send this message to all users?")
        .reply_markup(keyboard)
        .await?;

    dialogue
        .update(DialogueState::AwaitingBroadcastConfirmation {
            message: text.to_string(),
        })
        .await?;
    Ok(())
}

pub async fn handle_broadcast_confirmation(
    bot: Bot,
    dialogue: BotDialogue,
    q: CallbackQuery,
    db_pool: Arc<DatabasePool>,
    message: String,
) -> HandlerResult {
    let Some(data) = &q.data else {
        return Ok(());
    };

    // Drop the confirmation buttons either way.
    if let Some(msg) = &q.message {
        let _ = bot.edit_message_reply_markup(msg.chat().id, msg.id()).await;
    }

    if data == CB_BROADCAST_CANCEL {
        bot.answer_callback_query(q.id)
            .text("❌ Broadcast cancelled")
            .await?;
        dialogue.exit().await?;
        return Ok(());
    }
    if data != CB_BROADCAST_CONFIRM {
        return Ok(());
    }

    bot.answer_callback_query(q.id)
        .text("🚀 Starting broadcast...")
        .await?;

    let Some(msg) = &q.message else {
        dialogue.exit().await?;
        return Ok(());
    };
    let report_chat = msg.chat().id;

    match queries::all_user_ids(&db_pool).await {
        Ok(users) => {
            bot.send_message(report_chat, format!("🚀 Broadcasting to {} users...", users.len()))
                .await?;
            let (sent, failed) = fan_out(&bot, &users, &message).await;
            let report = format!(
                "✅ Broadcast completed!\n📊 Sent: {}/{}\n❌ Failed: {}",
                sent,
                users.len(),
                failed
            );
            bot.send_message(report_chat, report).await?;
        }
        Err(e) => {
            log::error!("broadcast user query failed: {}", e);
            bot.send_message(report_chat, "❌ Database error.").await?;
        }
    }

    dialogue.exit().await?;
    Ok(())
}

/// Best-effort delivery: individual failures are logged and counted, never
/// retried. Returns (sent, failed).
async fn fan_out(bot: &Bot, users: &[i64], message: &str) -> (usize, usize) {
    let mut sent = 0;
    let mut failed = 0;
    for (idx, user_id) in users.iter().enumerate() {
        if idx > 0 && idx % MESSAGES_PER_SECOND == 0 {
            sleep(Duration::from_secs(1)).await;
        }
        match bot
            .send_message(ChatId(*user_id), message)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => {
                log::warn!("broadcast to {} failed: {}", user_id, e);
                failed += 1;
                if let Some(secs) = extract_flood_wait(&e.to_string()) {
                    log::info!("FLOOD_WAIT_{}, backing off", secs);
                    sleep(Duration::from_secs(secs.min(30))).await;
                }
            }
        }
    }
    (sent, failed)
}

fn extract_flood_wait(error_str: &str) -> Option<u64> {
    use regex::Regex;
    let re = Regex::new(r"FLOOD_WAIT_(\d+)").unwrap();
    re.captures(error_str)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_flood_wait_parses_seconds() {
        assert_eq!(extract_flood_wait("A request error: FLOOD_WAIT_17"), Some(17));
        assert_eq!(extract_flood_wait("forbidden: bot was blocked"), None);
    }
}
