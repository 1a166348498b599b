use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatJoinRequest, InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use crate::database::queries::{self, OpChannel};
use crate::database::DatabasePool;
use crate::handlers::{HandlerResult, ui};
use crate::subscription::{BotGate, ChannelMode, JoinRequestLedger};

pub const CB_CHECK_SUBSCRIPTION: &str = "check_subscription";

/// Inbound join-request feed: the only obligation here is to record the
/// event in the ledger.
pub async fn join_request_handler(
    req: ChatJoinRequest,
    ledger: Arc<JoinRequestLedger>,
) -> HandlerResult {
    ledger.record(req.chat.id.0, req.from.id.0).await;
    Ok(())
}

pub fn subscription_keyboard(channels: &[&OpChannel]) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for channel in channels {
        match Url::parse(&channel.url) {
            Ok(url) => {
                let label = match channel.mode {
                    ChannelMode::Subscribe => format!("📢 {}", channel.name),
                    ChannelMode::JoinRequest => format!("📝 {}", channel.name),
                };
                rows.push(vec![InlineKeyboardButton::url(label, url)]);
            }
            Err(e) => log::warn!("bad url for channel {}: {}", channel.channel_id, e),
        }
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "✅ I subscribed",
        CB_CHECK_SUBSCRIPTION,
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub async fn prompt_subscription(
    bot: &Bot,
    chat_id: ChatId,
    channels: &[&OpChannel],
) -> HandlerResult {
    bot.send_message(
        chat_id,
        "🔒 To use the bot, join the channels below first, then press the button.",
    )
    .reply_markup(subscription_keyboard(channels))
    .await?;
    Ok(())
}

/// "I subscribed" button: re-evaluate the gate and either unlock the menu
/// or show the channels that are still outstanding.
pub async fn check_subscription_callback(
    bot: Bot,
    q: CallbackQuery,
    db_pool: Arc<DatabasePool>,
    gate: Arc<BotGate>,
) -> HandlerResult {
    let channels = queries::active_op_channels(&db_pool).await?;
    let unsatisfied = gate.filter_unsatisfied(q.from.id.0, &channels).await;

    if unsatisfied.is_empty() {
        bot.answer_callback_query(q.id).await?;
        if let Some(msg) = &q.message {
            let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            bot.send_message(msg.chat().id, "✅ All set! Welcome.")
                .reply_markup(ui::main_keyboard())
                .await?;
        }
        return Ok(());
    }

    bot.answer_callback_query(q.id)
        .text("❌ You haven't joined all the channels yet.")
        .show_alert(true)
        .await?;
    if let Some(msg) = &q.message {
        // Keep the prompt current: only the outstanding channels remain.
        let _ = bot
            .edit_message_reply_markup(msg.chat().id, msg.id())
            .reply_markup(subscription_keyboard(&unsatisfied))
            .await;
    }
    Ok(())
}
