use std::sync::Arc;

use anyhow::Error;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dptree;
use teloxide::prelude::*;

use crate::commands::Command;
use crate::database::DatabasePool;
use crate::handlers::{
    DialogueState, admin_panel, broadcast, callback_handler, command_handler,
    join_request_handler, text, text_handler,
};
use crate::subscription::{JoinRequestLedger, SubscriptionGate, TelegramMembership};

mod commands;
mod config;
mod database;
mod handlers;
mod subscription;

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_logging()?;

    log::info!("Starting StarsBot...");
    let start_time = std::time::Instant::now();

    if let Err(e) = config::load_environment() {
        log::error!("Failed to load environment: {}", e);
        return Err(e);
    }

    let db_path = database::get_database_path();
    if let Err(e) = database::init_database(&db_path) {
        log::error!("Failed to initialize the database: {}", e);
        return Err(e);
    }
    log::info!("Database initialized at {:?}", db_path);

    // Maximum 3 simultaneous database connections.
    let db_pool = Arc::new(DatabasePool::new(db_path, 3));

    // One ledger for the whole process, owned here and injected below.
    let ledger = Arc::new(JoinRequestLedger::new());
    ledger.start().await;

    let bot = Bot::from_env();
    let gate = Arc::new(SubscriptionGate::new(
        Arc::clone(&ledger),
        TelegramMembership::new(bot.clone()),
    ));

    let message_handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<DialogueState>, DialogueState>()
        .branch(dptree::case![DialogueState::AwaitingPromoCode].endpoint(text::receive_promo_code))
        .branch(
            dptree::case![DialogueState::AwaitingPromoDetails]
                .endpoint(admin_panel::receive_promo_details),
        )
        .branch(
            dptree::case![DialogueState::AwaitingOpChannel]
                .endpoint(admin_panel::receive_op_channel),
        )
        .branch(
            dptree::case![DialogueState::AwaitingTaskChannel]
                .endpoint(admin_panel::receive_task_channel),
        )
        .branch(
            dptree::case![DialogueState::AwaitingReferralReward]
                .endpoint(admin_panel::receive_referral_reward),
        )
        .branch(
            dptree::case![DialogueState::AwaitingBroadcastMessage]
                .endpoint(broadcast::receive_broadcast_message),
        )
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(dptree::endpoint(text_handler));

    let callback_query_handler = Update::filter_callback_query()
        .enter_dialogue::<CallbackQuery, InMemStorage<DialogueState>, DialogueState>()
        .branch(
            dptree::case![DialogueState::AwaitingBroadcastConfirmation { message }]
                .endpoint(broadcast::handle_broadcast_confirmation),
        )
        .branch(dptree::endpoint(callback_handler));

    let handler = dptree::entry()
        .branch(Update::filter_chat_join_request().endpoint(join_request_handler))
        .branch(message_handler)
        .branch(callback_query_handler);

    log::info!("Bot initialization completed in {:.2?}", start_time.elapsed());
    log::info!("Starting to dispatch updates...");

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            db_pool,
            Arc::clone(&ledger),
            gate,
            InMemStorage::<DialogueState>::new()
        ])
        .enable_ctrlc_handler()
        .build();

    // Run the dispatcher until it exits or the process is interrupted.
    tokio::select! {
        _ = dispatcher.dispatch() => {},
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down...");
        }
    }

    ledger.stop().await;
    log::info!("Bot shutdown complete");
    Ok(())
}

fn setup_logging() -> Result<(), Error> {
    use log::LevelFilter;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::Mutex;

    let console_level = match std::env::var("CONSOLE_LOG_LEVEL")
        .unwrap_or_else(|_| "INFO".to_string())
        .to_uppercase()
        .as_str()
    {
        "ERROR" => LevelFilter::Error,
        "DEBUG" => LevelFilter::Debug,
        _ => LevelFilter::Info,
    };

    // Optional error log file, for unattended deployments.
    let file_level = match std::env::var("FILE_LOG_LEVEL")
        .unwrap_or_else(|_| "OFF".to_string())
        .to_uppercase()
        .as_str()
    {
        "ERROR" => Some(LevelFilter::Error),
        "ALL" | "INFO" => Some(LevelFilter::Info),
        _ => None,
    };

    let log_file = if file_level.is_some() {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open("starsbot.log")?;
        Some(Arc::new(Mutex::new(file)))
    } else {
        None
    };

    let max_level = std::cmp::max(console_level, file_level.unwrap_or(LevelFilter::Off));

    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter(None, max_level)
        .format(move |buf, record| {
            let line = format!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            );
            if record.level() <= console_level {
                writeln!(buf, "{}", line)?;
            }
            if let (Some(file_level), Some(file)) = (file_level, &log_file) {
                if record.level() <= file_level {
                    if let Ok(mut guard) = file.lock() {
                        let _ = writeln!(guard, "{}", line);
                    }
                }
            }
            Ok(())
        })
        .init();
    Ok(())
}
