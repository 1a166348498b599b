use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use crate::config;
use crate::database::DatabasePool;
use crate::database::queries::{self, RedeemOutcome};
use crate::handlers::{BotDialogue, DialogueState, HandlerResult, admin_panel, tasks, ui};
use crate::subscription::JoinRequestLedger;

const MIN_WITHDRAW: f64 = 50.0;

/// Reply-keyboard dispatch. Unknown text is ignored so stray messages never
/// produce error replies.
pub async fn text_handler(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    db_pool: Arc<DatabasePool>,
    ledger: Arc<JoinRequestLedger>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if ui::is_admin_button(text) {
        let text = text.to_string();
        return admin_panel::admin_button_handler(bot, msg, dialogue, db_pool, ledger, &text).await;
    }

    match text {
        ui::BTN_GET_STARS => get_stars(bot, msg, db_pool).await,
        ui::BTN_PROFILE => profile(bot, msg, db_pool).await,
        ui::BTN_TASKS => tasks::give_task(bot, msg, db_pool).await,
        ui::BTN_PROMO => {
            bot.send_message(msg.chat.id, "🏅 Send your promo code (or /cancel).")
                .await?;
            dialogue.update(DialogueState::AwaitingPromoCode).await?;
            Ok(())
        }
        ui::BTN_WITHDRAW => withdraw(bot, msg, db_pool).await,
        ui::BTN_HELP => {
            let text = format!(
                "📕 Earn stars by inviting friends, completing channel tasks and \
                 redeeming promo codes.\n\nQuestions? Contact {}.",
                config::support_contact()
            );
            bot.send_message(msg.chat.id, text).await?;
            Ok(())
        }
        ui::BTN_BACK => {
            bot.send_message(msg.chat.id, "Main menu")
                .reply_markup(ui::main_keyboard())
                .await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn get_stars(bot: Bot, msg: Message, db_pool: Arc<DatabasePool>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let me = bot.get_me().await?;
    let reward = queries::referral_reward(&db_pool).await?;
    let invites = queries::invite_count(&db_pool, user.id.0 as i64).await?;
    let invite_link = format!("https://t.me/{}?start={}", me.username(), user.id);

    let text = format!(
        "+{reward} ⭐️ for every user you invite 🔥\n\n\
         👫 Share your link with friends and in chats!\n\n\
         🔗 Your invite link:\n{invite_link}\n\n\
         🏃 Joins via your link: {invites}"
    );

    let share_text = format!(
        "🌟 Earn stars with StarsBot! Join via my link:\n{}",
        invite_link
    );
    let share_url = Url::parse_with_params("https://t.me/share/url", [("url", share_text)])?;
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        "📤 Share with friends",
        share_url,
    )]]);

    bot.send_message(msg.chat.id, text)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn profile(bot: Bot, msg: Message, db_pool: Arc<DatabasePool>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(row) = queries::get_user(&db_pool, user.id.0 as i64).await? else {
        bot.send_message(msg.chat.id, "Press /start first.").await?;
        return Ok(());
    };
    let invites = queries::invite_count(&db_pool, row.telegram_id).await?;
    let name = row.username.map(|u| format!("@{}", u)).unwrap_or_default();
    let text = format!(
        "👤 Profile {}\n\n\
         🆔 {}\n\
         ⭐️ Balance: {:.1}\n\
         👫 Invited: {}\n\
         📅 With us since: {}",
        name, row.telegram_id, row.balance, invites, row.created_at
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn withdraw(bot: Bot, msg: Message, db_pool: Arc<DatabasePool>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let balance = queries::get_user(&db_pool, user.id.0 as i64)
        .await?
        .map(|row| row.balance)
        .unwrap_or(0.0);
    let text = if balance < MIN_WITHDRAW {
        format!(
            "💳 Withdrawals start at {} ⭐️. Your balance: {:.1} ⭐️.",
            MIN_WITHDRAW, balance
        )
    } else {
        format!(
            "💳 Your balance: {:.1} ⭐️.\nContact {} to process the withdrawal.",
            balance,
            config::support_contact()
        )
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn receive_promo_code(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db_pool: Arc<DatabasePool>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // A menu press mid-dialogue counts as a cancellation.
    if text == "/cancel" || ui::is_menu_button(text) || ui::is_admin_button(text) {
        dialogue.exit().await?;
        bot.send_message(msg.chat.id, "❌ Cancelled.")
            .reply_markup(ui::main_keyboard())
            .await?;
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let code = text.trim().to_uppercase();
    let outcome = queries::redeem_promo(&db_pool, code, user.id.0 as i64).await?;
    let reply = match outcome {
        RedeemOutcome::Redeemed(reward) => {
            format!("🎉 Promo accepted! +{} ⭐️", reward)
        }
        RedeemOutcome::AlreadyRedeemed => "❌ You already used this code.".to_string(),
        RedeemOutcome::Invalid => "❌ Unknown or expired code.".to_string(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    dialogue.exit().await?;
    Ok(())
}
