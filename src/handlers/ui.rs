use teloxide::types::{KeyboardButton, KeyboardMarkup};

pub const BTN_GET_STARS: &str = "🌟 Get stars";
pub const BTN_PROFILE: &str = "👤 Profile";
pub const BTN_TASKS: &str = "📚 Tasks";
pub const BTN_PROMO: &str = "🏅 Promo code";
pub const BTN_WITHDRAW: &str = "💳 Withdraw";
pub const BTN_HELP: &str = "📕 Help";
pub const BTN_BACK: &str = "◀️ Back";

pub const BTN_ADMIN_STATS: &str = "📊 Stats";
pub const BTN_ADMIN_OP_CHANNELS: &str = "📢 Required channels";
pub const BTN_ADMIN_TASK_CHANNELS: &str = "📝 Task channels";
pub const BTN_ADMIN_CREATE_PROMO: &str = "🎁 Create promo";
pub const BTN_ADMIN_REF_REWARD: &str = "💰 Referral reward";
pub const BTN_ADMIN_BROADCAST: &str = "📣 Broadcast";

pub fn main_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_GET_STARS)],
        vec![
            KeyboardButton::new(BTN_PROFILE),
            KeyboardButton::new(BTN_TASKS),
        ],
        vec![
            KeyboardButton::new(BTN_PROMO),
            KeyboardButton::new(BTN_WITHDRAW),
            KeyboardButton::new(BTN_HELP),
        ],
    ])
    .resize_keyboard()
}

pub fn admin_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_ADMIN_STATS)],
        vec![
            KeyboardButton::new(BTN_ADMIN_OP_CHANNELS),
            KeyboardButton::new(BTN_ADMIN_TASK_CHANNELS),
        ],
        vec![
            KeyboardButton::new(BTN_ADMIN_CREATE_PROMO),
            KeyboardButton::new(BTN_ADMIN_REF_REWARD),
        ],
        vec![KeyboardButton::new(BTN_ADMIN_BROADCAST)],
        vec![KeyboardButton::new(BTN_BACK)],
    ])
    .resize_keyboard()
}

pub fn is_menu_button(text: &str) -> bool {
    matches!(
        text,
        BTN_GET_STARS | BTN_PROFILE | BTN_TASKS | BTN_PROMO | BTN_WITHDRAW | BTN_HELP | BTN_BACK
    )
}

pub fn is_admin_button(text: &str) -> bool {
    matches!(
        text,
        BTN_ADMIN_STATS
            | BTN_ADMIN_OP_CHANNELS
            | BTN_ADMIN_TASK_CHANNELS
            | BTN_ADMIN_CREATE_PROMO
            | BTN_ADMIN_REF_REWARD
            | BTN_ADMIN_BROADCAST
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_menu_button() {
        assert!(is_menu_button(BTN_GET_STARS));
        assert!(is_menu_button(BTN_PROFILE));
        assert!(is_menu_button(BTN_BACK));
        assert!(!is_menu_button(BTN_ADMIN_STATS));
        assert!(!is_menu_button("some other text"));
    }

    #[test]
    fn test_is_admin_button() {
        assert!(is_admin_button(BTN_ADMIN_BROADCAST));
        assert!(is_admin_button(BTN_ADMIN_OP_CHANNELS));
        assert!(!is_admin_button(BTN_PROFILE));
    }
}
