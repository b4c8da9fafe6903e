//! Configuration and settings management
//!
//! Loads settings from config files and `OCB_`-prefixed environment variables
//! and defines the poll and table constants.

use chrono::Weekday;
use config::{Config, ConfigError, Environment, File};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Discord bot token
    pub token: String,

    /// Guild the poll lives in
    pub guild_id: u64,

    /// Name of the channel carrying the poll message
    pub channel_name: String,

    /// Name of the channel receiving rendered tables and archived results
    pub dump_channel_name: String,

    /// Role to mention in new polls; `None` mentions everyone
    #[serde(default, deserialize_with = "deserialize_role_id")]
    pub notify_role_id: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path of the YAML template document
    #[serde(default = "default_template_file")]
    pub template_file: PathBuf,

    /// Directory holding twemoji PNG assets
    #[serde(default = "default_emoji_dir")]
    pub emoji_dir: PathBuf,

    /// Fetch unicode emoji art from the CDN instead of `emoji_dir`
    #[serde(default)]
    pub use_remote_emoji: bool,

    /// Quiet period after the last reaction before the table is redrawn
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

/// Role id from a number, a numeric string, or `none` (any case) for unset
fn deserialize_role_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRole {
        Id(u64),
        Text(String),
    }

    match Option::<RawRole>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawRole::Id(id)) => Ok(Some(id)),
        Some(RawRole::Text(text)) => {
            let text = text.trim();
            if text.is_empty() || text.eq_ignore_ascii_case("none") {
                Ok(None)
            } else {
                text.parse().map(Some).map_err(de::Error::custom)
            }
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_template_file() -> PathBuf {
    PathBuf::from(DEFAULT_TEMPLATE_FILE)
}

fn default_emoji_dir() -> PathBuf {
    PathBuf::from(DEFAULT_EMOJI_DIR)
}

const fn default_debounce_secs() -> u64 {
    DEBOUNCE_SECS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ocb_poll_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg. `OCB_GUILD_ID=1234 ./target/ocb-poll-bot` sets `guild_id`
            .add_source(
                Environment::with_prefix("OCB")
                    .prefix_separator("_")
                    .try_parsing(true)
                    .ignore_empty(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Debounce delay as a `Duration`
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Mention placed in the poll header
    #[must_use]
    pub fn mention(&self) -> String {
        self.notify_role_id
            .map_or_else(|| "@everyone".to_string(), |id| format!("<@&{id}>"))
    }
}

/// Tag identifying the poll message in the poll channel
pub const POLL_TAG: &str = "{poll}";
/// Tag identifying rendered table artifacts
pub const POLL_TABLE_MARKER: &str = "{polltable}";
/// Tag identifying archived results in the dump channel
pub const RESULTS_MARKER: &str = "{results}";

/// Attendance reaction
pub const THUMB_UP: &str = "👍";
/// Excluded "not coming" reaction
pub const THUMB_DOWN: &str = "👎";
/// Check mark used by the printed text table
pub const CHECK: &str = "✅";
/// Narrow check mark used when the text table is posted to the channel
pub const CHECK_NARROW: &str = "✔";

/// Expression resolving the previous game night
pub const LAST_GAME_DATE_EXPR: &str = "last thursday";
/// Expression resolving the next game night
pub const NEXT_GAME_DATE_EXPR: &str = "next thursday";

/// Weekday the poll is reset on
pub const RESET_WEEKDAY: Weekday = Weekday::Fri;
/// Local hour the poll is reset at
pub const RESET_HOUR: u32 = 8;
/// A found poll older than this is stale
pub const POLL_PERIOD_DAYS: i64 = 7;

/// Default debounce delay in seconds
pub const DEBOUNCE_SECS: u64 = 10;

/// Default template document path
pub const DEFAULT_TEMPLATE_FILE: &str = "poll_messages.yaml";
/// Default twemoji asset directory
pub const DEFAULT_EMOJI_DIR: &str = "data/emoji";
/// Remote twemoji template; `{}` is replaced by the file name
pub const EMOJI_CDN_TEMPLATE: &str = "https://twemoji.maxcdn.com/v/latest/72x72/{}";
/// Base URL for custom emoji assets
pub const CUSTOM_EMOJI_CDN_BASE: &str = "https://cdn.discordapp.com/emojis";
/// File name of the uploaded table image
pub const TABLE_FILE_NAME: &str = "this_weeks_games.png";

// Table geometry
/// Outer padding around the grid in pixels
pub const TABLE_PADDING_WIDTH: u32 = 10;
/// Side of one square cell in pixels
pub const TABLE_SQUARE_SIZE: u32 = 128;
/// Gap between cells in pixels
pub const TABLE_SQUARE_PADDING: u32 = 5;
/// Placeholder tile colour (RGBA)
pub const PLACEHOLDER_COLOR: [u8; 4] = [0, 0, 255, 255];

// Network
/// Timeout for a single image download
pub const IMAGE_FETCH_TIMEOUT_SECS: u64 = 10;
/// Timeout for a platform message fetch
pub const PLATFORM_FETCH_TIMEOUT_SECS: u64 = 15;
/// Maximum retries for platform sends
pub const PLATFORM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for platform sends
pub const PLATFORM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for platform sends
pub const PLATFORM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Discord message length limit with a safety margin
pub const PLATFORM_MESSAGE_LIMIT: usize = 1900;

/// Maximum number of decoded images kept in memory
pub const IMAGE_CACHE_MAX_SIZE: u64 = 1_000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clear_env() {
        for key in [
            "OCB_TOKEN",
            "OCB_GUILD_ID",
            "OCB_CHANNEL_NAME",
            "OCB_DUMP_CHANNEL_NAME",
            "OCB_NOTIFY_ROLE_ID",
            "OCB_DEBOUNCE_SECS",
        ] {
            env::remove_var(key);
        }
    }

    // Tests run sequentially in one function to avoid environment variable races
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        clear_env();

        // 1. Required keys only
        env::set_var("OCB_TOKEN", "dummy_token");
        env::set_var("OCB_GUILD_ID", "123456789");
        env::set_var("OCB_CHANNEL_NAME", "games");
        env::set_var("OCB_DUMP_CHANNEL_NAME", "games-dump");

        let settings = Settings::new()?;
        assert_eq!(settings.token, "dummy_token");
        assert_eq!(settings.guild_id, 123_456_789);
        assert_eq!(settings.channel_name, "games");
        assert_eq!(settings.dump_channel_name, "games-dump");
        assert_eq!(settings.notify_role_id, None);
        assert_eq!(settings.debounce_secs, DEBOUNCE_SECS);
        assert_eq!(settings.mention(), "@everyone");

        // 2. Empty role id is treated as unset
        env::set_var("OCB_NOTIFY_ROLE_ID", "");
        let settings = Settings::new()?;
        assert_eq!(settings.notify_role_id, None);

        // 3. "none" in any case means no role
        env::set_var("OCB_NOTIFY_ROLE_ID", "none");
        let settings = Settings::new()?;
        assert_eq!(settings.notify_role_id, None);
        assert_eq!(settings.mention(), "@everyone");
        env::set_var("OCB_NOTIFY_ROLE_ID", "None");
        assert_eq!(Settings::new()?.notify_role_id, None);

        // 4. Anything else that is not a number is rejected
        env::set_var("OCB_NOTIFY_ROLE_ID", "moderators");
        assert!(Settings::new().is_err());

        // 5. Role id and debounce override
        env::set_var("OCB_NOTIFY_ROLE_ID", "42");
        env::set_var("OCB_DEBOUNCE_SECS", "3");
        let settings = Settings::new()?;
        assert_eq!(settings.notify_role_id, Some(42));
        assert_eq!(settings.mention(), "<@&42>");
        assert_eq!(settings.debounce(), Duration::from_secs(3));

        // 6. Missing token is an error
        env::remove_var("OCB_TOKEN");
        assert!(Settings::new().is_err());

        clear_env();
        Ok(())
    }
}
