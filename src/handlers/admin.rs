use teloxide::prelude::*;
use teloxide::types::UserId;

use crate::config;

pub fn is_admin(msg: &Message) -> bool {
    msg.from
        .as_ref()
        .map(|user| is_admin_user(user.id))
        .unwrap_or(false)
}

pub fn is_admin_user(user_id: UserId) -> bool {
    config::admin_ids().contains(&(user_id.0 as i64))
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_admin_id_matching() {
        let admin_ids = vec![123456i64, 789012i64];

        let telegram_user_id: u64 = 123456;
        assert!(admin_ids.contains(&(telegram_user_id as i64)));

        let regular_user_id: u64 = 555555;
        assert!(!admin_ids.contains(&(regular_user_id as i64)));
    }
}
