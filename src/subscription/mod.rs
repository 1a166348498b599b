//! Subscription gating: an in-memory ledger of pending channel join
//! requests plus the gate that reconciles it with live membership lookups.

pub mod gate;
pub mod ledger;

pub use gate::{
    ChannelMode, ChannelRequirement, EXEMPT_CHANNEL_ID, MembershipApi, Requirement,
    SubscriptionGate, TelegramMembership,
};
pub use ledger::{JoinRequestLedger, REQUEST_TIMEOUT, SWEEP_INTERVAL};

/// The gate wired to the real Telegram API, as injected into handlers.
pub type BotGate = SubscriptionGate<TelegramMembership>;
