use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "start the bot.")]
    Start(String),
    #[command(description = "display this text.")]
    Help,
    #[command(description = "open the admin panel.")]
    Admin,
}
