use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands;

use crate::commands::Command;
use crate::database::DatabasePool;
use crate::database::queries;
use crate::handlers::subscription::prompt_subscription;
use crate::handlers::{HandlerResult, admin, admin_panel, ui};
use crate::subscription::BotGate;

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    db_pool: Arc<DatabasePool>,
    gate: Arc<BotGate>,
) -> HandlerResult {
    match cmd {
        Command::Start(payload) => start(bot, msg, payload, db_pool, gate).await,
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
            Ok(())
        }
        Command::Admin => admin_panel::admin_panel_text_handler(bot, msg).await,
    }
}

async fn start(
    bot: Bot,
    msg: Message,
    payload: String,
    db_pool: Arc<DatabasePool>,
    gate: Arc<BotGate>,
) -> HandlerResult {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    // Deep-link referral payload: /start <referrer_id>.
    let referred_by = payload
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|&referrer| referrer != user_id);

    let newly_registered =
        queries::register_user(&db_pool, user_id, user.username.clone(), referred_by).await?;

    if newly_registered {
        log::info!("new user {} (referred by {:?})", user_id, referred_by);
        if let Some(referrer) = referred_by {
            credit_referral(&bot, &db_pool, referrer).await;
        }
    }

    let channels = queries::active_op_channels(&db_pool).await?;
    let unsatisfied = gate.filter_unsatisfied(user.id.0, &channels).await;
    if unsatisfied.is_empty() {
        bot.send_message(msg.chat.id, "👋 Welcome to StarsBot!")
            .reply_markup(ui::main_keyboard())
            .await?;
        if admin::is_admin(&msg) {
            bot.send_message(msg.chat.id, "You are an admin. Use /admin for the panel.")
                .await?;
        }
    } else {
        prompt_subscription(&bot, msg.chat.id, &unsatisfied).await?;
    }
    Ok(())
}

/// Best effort: the referral credit must never fail the /start flow.
async fn credit_referral(bot: &Bot, db_pool: &DatabasePool, referrer: i64) {
    let reward = match queries::referral_reward(db_pool).await {
        Ok(reward) => reward,
        Err(e) => {
            log::error!("failed to read referral reward: {}", e);
            return;
        }
    };
    if let Err(e) = queries::add_balance(db_pool, referrer, reward).await {
        log::error!("failed to credit referrer {}: {}", referrer, e);
        return;
    }
    let note = format!("🎉 Someone joined via your link! +{} ⭐️", reward);
    if let Err(e) = bot.send_message(ChatId(referrer), note).await {
        log::warn!("could not notify referrer {}: {}", referrer, e);
    }
}
