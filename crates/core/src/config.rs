use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Weekday;
use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::poll::VOTE_MARKERS;
use crate::keywords::{KeywordMatcher, DEFAULT_KEYWORDS};
use crate::mentions::MentionSettings;
use crate::polls::PollSettings;
use crate::schedule::CandidateSchedule;

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub flow: FlowConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub token: SecretString,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    pub mention_threshold: u32,
    pub reaction_threshold: u32,
    pub idle_window_secs: u64,
    pub prompt_expiry_secs: u64,
    pub vote_window_secs: u64,
    pub keywords: Vec<String>,
    pub candidate_count: usize,
    pub weekday: Weekday,
    pub cutoff_hour: u32,
    pub timezone: Tz,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub health_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub chat_token: Option<String>,
    pub chat_api_base_url: Option<String>,
    pub log_level: Option<String>,
    pub timezone: Option<String>,
    pub health_check_port: Option<u16>,
    pub health_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                token: String::new().into(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                request_timeout_secs: 30,
            },
            flow: FlowConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                health_enabled: true,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            mention_threshold: 2,
            reaction_threshold: 1,
            idle_window_secs: 30 * 60,
            prompt_expiry_secs: 10 * 60,
            vote_window_secs: 24 * 60 * 60,
            keywords: DEFAULT_KEYWORDS.iter().map(|keyword| keyword.to_string()).collect(),
            candidate_count: VOTE_MARKERS.len(),
            weekday: Weekday::Fri,
            cutoff_hour: 18,
            timezone: Tz::UTC,
        }
    }
}

impl FlowConfig {
    pub fn mention_settings(&self) -> MentionSettings {
        MentionSettings {
            threshold: self.mention_threshold as usize,
            idle_window: seconds(self.idle_window_secs),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            reaction_threshold: self.reaction_threshold,
            vote_window: seconds(self.vote_window_secs),
        }
    }

    pub fn candidate_schedule(&self) -> CandidateSchedule {
        CandidateSchedule {
            weekday: self.weekday,
            cutoff_hour: self.cutoff_hour,
            count: self.candidate_count,
            timezone: self.timezone,
        }
    }

    pub fn keyword_matcher(&self) -> KeywordMatcher {
        KeywordMatcher::new(&self.keywords)
    }

    pub fn prompt_expiry(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.prompt_expiry_secs)
    }

    pub fn vote_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.vote_window_secs)
    }
}

fn seconds(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hotbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides)?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(chat) = patch.chat {
            if let Some(chat_token_value) = chat.token {
                self.chat.token = secret_value(chat_token_value);
            }
            if let Some(api_base_url) = chat.api_base_url {
                self.chat.api_base_url = api_base_url;
            }
            if let Some(request_timeout_secs) = chat.request_timeout_secs {
                self.chat.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(flow) = patch.flow {
            if let Some(mention_threshold) = flow.mention_threshold {
                self.flow.mention_threshold = mention_threshold;
            }
            if let Some(reaction_threshold) = flow.reaction_threshold {
                self.flow.reaction_threshold = reaction_threshold;
            }
            if let Some(idle_window_secs) = flow.idle_window_secs {
                self.flow.idle_window_secs = idle_window_secs;
            }
            if let Some(prompt_expiry_secs) = flow.prompt_expiry_secs {
                self.flow.prompt_expiry_secs = prompt_expiry_secs;
            }
            if let Some(vote_window_secs) = flow.vote_window_secs {
                self.flow.vote_window_secs = vote_window_secs;
            }
            if let Some(keywords) = flow.keywords {
                self.flow.keywords = keywords;
            }
            if let Some(candidate_count) = flow.candidate_count {
                self.flow.candidate_count = candidate_count;
            }
            if let Some(weekday) = flow.weekday {
                self.flow.weekday = parse_weekday("flow.weekday", &weekday)?;
            }
            if let Some(cutoff_hour) = flow.cutoff_hour {
                self.flow.cutoff_hour = cutoff_hour;
            }
            if let Some(timezone) = flow.timezone {
                self.flow.timezone = parse_timezone("flow.timezone", &timezone)?;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(health_enabled) = server.health_enabled {
                self.server.health_enabled = health_enabled;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let token = read_env("HOTBOT_CHAT_TOKEN").or_else(|| read_env("DISCORD_TOKEN"));
        if let Some(value) = token {
            self.chat.token = secret_value(value);
        }
        if let Some(value) = read_env("HOTBOT_CHAT_API_BASE_URL") {
            self.chat.api_base_url = value;
        }
        if let Some(value) = read_env("HOTBOT_CHAT_REQUEST_TIMEOUT_SECS") {
            self.chat.request_timeout_secs = parse_u64("HOTBOT_CHAT_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HOTBOT_FLOW_MENTION_THRESHOLD") {
            self.flow.mention_threshold = parse_u32("HOTBOT_FLOW_MENTION_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_REACTION_THRESHOLD") {
            self.flow.reaction_threshold = parse_u32("HOTBOT_FLOW_REACTION_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_IDLE_WINDOW_SECS") {
            self.flow.idle_window_secs = parse_u64("HOTBOT_FLOW_IDLE_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_PROMPT_EXPIRY_SECS") {
            self.flow.prompt_expiry_secs = parse_u64("HOTBOT_FLOW_PROMPT_EXPIRY_SECS", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_VOTE_WINDOW_SECS") {
            self.flow.vote_window_secs = parse_u64("HOTBOT_FLOW_VOTE_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_KEYWORDS") {
            self.flow.keywords = value.split(',').map(|keyword| keyword.trim().to_string()).collect();
        }
        if let Some(value) = read_env("HOTBOT_FLOW_WEEKDAY") {
            self.flow.weekday = parse_weekday("HOTBOT_FLOW_WEEKDAY", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_CUTOFF_HOUR") {
            self.flow.cutoff_hour = parse_u32("HOTBOT_FLOW_CUTOFF_HOUR", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_FLOW_TIMEZONE") {
            self.flow.timezone = parse_timezone("HOTBOT_FLOW_TIMEZONE", &value)?;
        }

        if let Some(value) = read_env("HOTBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HOTBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("HOTBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("HOTBOT_SERVER_HEALTH_ENABLED") {
            self.server.health_enabled = parse_bool("HOTBOT_SERVER_HEALTH_ENABLED", &value)?;
        }

        let log_level = read_env("HOTBOT_LOGGING_LEVEL").or_else(|| read_env("HOTBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HOTBOT_LOGGING_FORMAT").or_else(|| read_env("HOTBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(chat_token) = overrides.chat_token {
            self.chat.token = secret_value(chat_token);
        }
        if let Some(api_base_url) = overrides.chat_api_base_url {
            self.chat.api_base_url = api_base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(timezone) = overrides.timezone {
            self.flow.timezone = parse_timezone("timezone override", &timezone)?;
        }
        if let Some(health_check_port) = overrides.health_check_port {
            self.server.health_check_port = health_check_port;
        }
        if let Some(health_enabled) = overrides.health_enabled {
            self.server.health_enabled = health_enabled;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chat(&self.chat)?;
        validate_flow(&self.flow)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hotbot.toml"), PathBuf::from("config/hotbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    let token = chat.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.token is required. Get it from https://discord.com/developers/applications > Your App > Bot > Token".to_string()
        ));
    }
    if token.starts_with("Bot ") || token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "chat.token must be the raw bot token without a `Bot ` prefix or whitespace"
                .to_string(),
        ));
    }

    if !chat.api_base_url.starts_with("http://") && !chat.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "chat.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if chat.request_timeout_secs == 0 || chat.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "chat.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_flow(flow: &FlowConfig) -> Result<(), ConfigError> {
    if flow.mention_threshold == 0 {
        return Err(ConfigError::Validation(
            "flow.mention_threshold must be greater than zero".to_string(),
        ));
    }
    if flow.reaction_threshold == 0 {
        return Err(ConfigError::Validation(
            "flow.reaction_threshold must be greater than zero".to_string(),
        ));
    }
    if flow.idle_window_secs == 0 || flow.prompt_expiry_secs == 0 || flow.vote_window_secs == 0 {
        return Err(ConfigError::Validation(
            "flow.idle_window_secs, flow.prompt_expiry_secs and flow.vote_window_secs must be greater than zero"
                .to_string(),
        ));
    }
    if flow.keywords.iter().all(|keyword| keyword.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "flow.keywords must contain at least one non-empty keyword".to_string(),
        ));
    }
    if flow.candidate_count != VOTE_MARKERS.len() {
        return Err(ConfigError::Validation(format!(
            "flow.candidate_count must be {} (one per vote marker)",
            VOTE_MARKERS.len()
        )));
    }
    if flow.cutoff_hour > 23 {
        return Err(ConfigError::Validation("flow.cutoff_hour must be in range 0..=23".to_string()));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_enabled && server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_weekday(key: &str, value: &str) -> Result<Weekday, ConfigError> {
    value.trim().parse::<Weekday>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_timezone(key: &str, value: &str) -> Result<Tz, ConfigError> {
    value.trim().parse::<Tz>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    chat: Option<ChatPatch>,
    flow: Option<FlowPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    token: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowPatch {
    mention_threshold: Option<u32>,
    reaction_threshold: Option<u32>,
    idle_window_secs: Option<u64>,
    prompt_expiry_secs: Option<u64>,
    vote_window_secs: Option<u64>,
    keywords: Option<Vec<String>>,
    candidate_count: Option<usize>,
    weekday: Option<String>,
    cutoff_hour: Option<u32>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    health_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
