//! Keys of the application's logical tables.
//!
//! Every key shares the `adachi.` namespace so the application can live in a store shared with
//! unrelated data. Each constant is an independent table, per-entity records append their id to
//! it (e.g. `adachi.user-info-<user id>`).

pub const NAMESPACE: &str = "adachi.";

/* Guilds */
/// Guilds the bot was banned from.
pub const GUILD_BAN: &str = "adachi.banned-guild";
/// Every guild the bot is in.
pub const GUILD_USED: &str = "adachi.guild-used";
/// Channels used for proactive messages, per guild.
pub const GUILD_USED_CHANNEL: &str = "adachi.guild-used-channel";
/// First guild in which the bot master was seen.
pub const GUILD_MASTER: &str = "adachi.guild-master";
pub const GUILD_INFO: &str = "adachi.guild-info";
/// Message ids kept to answer proactive pushes as replies, which keeps the push count down.
pub const GUILD_TEMP_MSG_ID: &str = "adachi.msgId-temp";

/* Users */
pub const USER_BOT_ID: &str = "adachi.user-bot-id";
pub const USER_INFO: &str = "adachi.user-info";
/// Guilds in which a user talked to the bot.
pub const USER_USED_GUILD: &str = "adachi.user-used-guild";

/* Commands */
pub const COMMAND_STAT: &str = "adachi.command-stat";
pub const COMMAND_LIMIT_USER: &str = "adachi.command-limit-user";
pub const COMMAND_LIMIT_GUILD: &str = "adachi.command-limit-guild";

/* Management */
pub const AUTH_LEVEL: &str = "adachi.auth-level";
/// Sub-channels the bot may answer in.
pub const CHANNEL_LIMIT: &str = "adachi.channel-limit";

/* Bot functions */
/// Where to answer once the bot is back from a restart.
pub const RESTART_PARAM: &str = "adachi.restart-param";
pub const HELP_DATA: &str = "adachi.help-data";
pub const MESSAGE_CALL_PASSIVE: &str = "adachi.message-call-passive";
pub const MESSAGE_CALL_INITIATIVE: &str = "adachi.message-call-initiative";
pub const PLUGIN_UPDATE_TIME: &str = "adachi.plugin-update-time";
pub const BOT_UPDATE_TIME: &str = "adachi.bot-update-time";

/// Key of the record of `id` in `table`.
pub fn record(table: &str, id: impl std::fmt::Display) -> String {
    format!("{}-{}", table, id)
}
