use crate::error::ConfigError;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_CONVERSATIONS_DIR: &str = "conversations";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// What a webhook handler does when it cannot build its normal answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Speak an apology and let the call end.
    #[default]
    Apologize,
    /// Answer 500 with the error text. Useful while developing; Twilio will play its own
    /// application-error message to the caller.
    Surface,
}

impl FromStr for FaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apologize" => Ok(FaultPolicy::Apologize),
            "surface" => Ok(FaultPolicy::Surface),
            other => Err(format!("expected `apologize` or `surface`, got `{other}`")),
        }
    }
}

/// Settings for the webhook server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub conversations_dir: PathBuf,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub generation_timeout: Duration,
    pub fault_policy: FaultPolicy,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let openai_api_key = required("OPENAI_API_KEY", lookup("OPENAI_API_KEY"))?;
        let bind_addr = parsed("BIND_ADDR", lookup("BIND_ADDR"), DEFAULT_BIND_ADDR)?;
        let generation_timeout_secs: u64 = parsed(
            "GENERATION_TIMEOUT_SECS",
            lookup("GENERATION_TIMEOUT_SECS"),
            &DEFAULT_GENERATION_TIMEOUT_SECS.to_string(),
        )?;
        let fault_policy = parsed("FAULT_POLICY", lookup("FAULT_POLICY"), "apologize")?;

        Ok(Self {
            bind_addr,
            conversations_dir: PathBuf::from(
                optional(lookup("CONVERSATIONS_DIR"))
                    .unwrap_or_else(|| DEFAULT_CONVERSATIONS_DIR.to_string()),
            ),
            openai_api_key,
            openai_api_base: optional(lookup("OPENAI_API_BASE"))
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            openai_model: optional(lookup("OPENAI_MODEL"))
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            generation_timeout: Duration::from_secs(generation_timeout_secs),
            fault_policy,
        })
    }
}

/// A value that must be present and non-blank.
pub fn required(name: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    optional(value).ok_or(ConfigError::Missing(name))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(name: &'static str, value: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = optional(value).unwrap_or_else(|| default.to_string());
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason: e.to_string(),
    })
}
