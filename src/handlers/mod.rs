use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

pub mod admin;
pub mod admin_panel;
pub mod broadcast;
pub mod callback;
pub mod command;
pub mod subscription;
pub mod tasks;
pub mod text;
pub mod ui;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type BotDialogue = Dialogue<DialogueState, InMemStorage<DialogueState>>;

/// Multi-step conversations: promo entry for users, channel/promo creation
/// and broadcast for admins. Everything else is handled statelessly.
#[derive(Clone, Default, Debug)]
pub enum DialogueState {
    #[default]
    Idle,
    AwaitingPromoCode,
    AwaitingPromoDetails,
    AwaitingOpChannel,
    AwaitingTaskChannel,
    AwaitingReferralReward,
    AwaitingBroadcastMessage,
    AwaitingBroadcastConfirmation {
        message: String,
    },
}

pub use callback::callback_handler;
pub use command::command_handler;
pub use subscription::join_request_handler;
pub use text::text_handler;
