use std::sync::Arc;

use teloxide::prelude::*;

use crate::database::DatabasePool;
use crate::database::queries;
use crate::handlers::admin::is_admin_user;
use crate::handlers::admin_panel::{CB_OP_ADD, CB_OP_DEL, CB_TASK_ADD, CB_TASK_DEL};
use crate::handlers::subscription::{CB_CHECK_SUBSCRIPTION, check_subscription_callback};
use crate::handlers::tasks::{CB_CHECK_TASK, check_task_callback};
use crate::handlers::{BotDialogue, DialogueState, HandlerResult};
use crate::subscription::BotGate;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    db_pool: Arc<DatabasePool>,
    gate: Arc<BotGate>,
) -> HandlerResult {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    log::debug!("callback from {}: {}", q.from.id, data);

    if data == CB_CHECK_SUBSCRIPTION {
        return check_subscription_callback(bot, q, db_pool, gate).await;
    }

    if let Some(raw_id) = data.strip_prefix(CB_CHECK_TASK) {
        let Ok(task_id) = raw_id.parse() else {
            return Ok(());
        };
        return check_task_callback(bot, q, task_id, db_pool, gate).await;
    }

    // Everything below is the admin panel.
    if !is_admin_user(q.from.id) {
        bot.answer_callback_query(q.id).text("Access denied.").await?;
        return Ok(());
    }

    match data.as_str() {
        CB_OP_ADD => {
            bot.answer_callback_query(q.id).await?;
            if let Some(msg) = &q.message {
                bot.send_message(
                    msg.chat().id,
                    "Send: <channel_id>, <name>, <url>[, request]\n/cancel to abort.",
                )
                .await?;
            }
            dialogue.update(DialogueState::AwaitingOpChannel).await?;
        }
        CB_TASK_ADD => {
            bot.answer_callback_query(q.id).await?;
            if let Some(msg) = &q.message {
                bot.send_message(
                    msg.chat().id,
                    "Send: <channel_id>, <name>, <url>, <reward>[, limit][, request]\n/cancel to abort.",
                )
                .await?;
            }
            dialogue.update(DialogueState::AwaitingTaskChannel).await?;
        }
        _ => {
            if let Some(raw_id) = data.strip_prefix(CB_OP_DEL) {
                if let Ok(id) = raw_id.parse() {
                    let removed = queries::remove_op_channel(&db_pool, id).await?;
                    let note = if removed { "🗑 Channel removed." } else { "Already gone." };
                    bot.answer_callback_query(q.id).text(note).await?;
                }
            } else if let Some(raw_id) = data.strip_prefix(CB_TASK_DEL) {
                if let Ok(id) = raw_id.parse() {
                    let removed = queries::remove_task_channel(&db_pool, id).await?;
                    let note = if removed { "🗑 Task removed." } else { "Already gone." };
                    bot.answer_callback_query(q.id).text(note).await?;
                }
            }
        }
    }
    Ok(())
}
