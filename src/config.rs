use anyhow::{Result, bail};

/// Loads `.env` and validates the variables the bot cannot run without.
pub fn load_environment() -> Result<()> {
    dotenv::dotenv().ok();
    if std::env::var("TELOXIDE_TOKEN").is_err() {
        bail!("TELOXIDE_TOKEN is not set");
    }
    if admin_ids().is_empty() {
        log::warn!("ADMIN_IDS is empty, the admin panel will be inaccessible");
    }
    Ok(())
}

pub fn admin_ids() -> Vec<i64> {
    parse_admin_ids(&std::env::var("ADMIN_IDS").unwrap_or_default())
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

pub fn support_contact() -> String {
    std::env::var("SUPPORT_CONTACT").unwrap_or_else(|_| "the administrator".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parse_admin_ids_handles_spaces_and_garbage() {
        assert_eq!(parse_admin_ids("123456,789012, 345678"), vec![123456, 789012, 345678]);
        assert_eq!(parse_admin_ids(" 111 , abc , 222 "), vec![111, 222]);
        assert_eq!(parse_admin_ids(""), Vec::<i64>::new());
    }

    #[test]
    #[serial]
    fn admin_ids_reads_the_environment() {
        unsafe { std::env::set_var("ADMIN_IDS", "42, 7") };
        assert_eq!(admin_ids(), vec![42, 7]);
        unsafe { std::env::remove_var("ADMIN_IDS") };
        assert_eq!(admin_ids(), Vec::<i64>::new());
    }
}
