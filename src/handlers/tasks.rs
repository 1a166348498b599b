use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use crate::database::DatabasePool;
use crate::database::queries::{self, TaskChannel};
use crate::handlers::HandlerResult;
use crate::subscription::{BotGate, ChannelMode};

pub const CB_CHECK_TASK: &str = "check_task:";

fn task_text(task: &TaskChannel, heading: &str) -> String {
    let action = match task.mode {
        ChannelMode::Subscribe => "Subscribe to",
        ChannelMode::JoinRequest => "Request to join",
    };
    format!(
        "📌 {heading}: {action} «{}»\n💰 Reward: {} ⭐️\n\n👉 Use the buttons below.",
        task.name, task.reward
    )
}

fn task_keyboard(task: &TaskChannel) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Ok(url) = Url::parse(&task.url) {
        rows.push(vec![InlineKeyboardButton::url("✅ Open channel", url)]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🔄 Check",
        format!("{}{}", CB_CHECK_TASK, task.id),
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub async fn give_task(bot: Bot, msg: Message, db_pool: Arc<DatabasePool>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(task) = queries::next_task_for(&db_pool, user.id.0 as i64).await? else {
        bot.send_message(msg.chat.id, "🎉 All tasks are done! Check back later.")
            .await?;
        return Ok(());
    };
    bot.send_message(msg.chat.id, task_text(&task, "Task"))
        .reply_markup(task_keyboard(&task))
        .await?;
    Ok(())
}

/// "Check" button under a task: verify through the gate, credit once, then
/// roll the message over to the next task.
pub async fn check_task_callback(
    bot: Bot,
    q: CallbackQuery,
    task_id: i64,
    db_pool: Arc<DatabasePool>,
    gate: Arc<BotGate>,
) -> HandlerResult {
    let user_id = q.from.id;
    let Some(task) = queries::task_channel_by_id(&db_pool, task_id).await? else {
        bot.answer_callback_query(q.id)
            .text("❌ This task no longer exists.")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    if !gate.check(user_id.0, &task).await {
        let hint = match task.mode {
            ChannelMode::Subscribe => "❌ You are not subscribed yet.",
            ChannelMode::JoinRequest => "❌ No join request found. Submit one and try again.",
        };
        bot.answer_callback_query(q.id).text(hint).show_alert(true).await?;
        return Ok(());
    }

    let credited = queries::complete_task(&db_pool, user_id.0 as i64, &task).await?;
    if credited {
        bot.answer_callback_query(q.id)
            .text(format!("🎉 Done! +{} ⭐️", task.reward))
            .show_alert(true)
            .await?;
    } else {
        bot.answer_callback_query(q.id)
            .text("You already completed this task.")
            .await?;
    }

    // Show the next task in place of the old one.
    if let Some(msg) = q.message.as_ref().and_then(|m| m.regular_message()) {
        match queries::next_task_for(&db_pool, user_id.0 as i64).await? {
            Some(next) => {
                bot.edit_message_text(msg.chat.id, msg.id, task_text(&next, "Next task"))
                    .reply_markup(task_keyboard(&next))
                    .await?;
            }
            None => {
                bot.edit_message_text(msg.chat.id, msg.id, "🎉 All tasks are done for now!")
                    .await?;
            }
        }
    }
    Ok(())
}
