use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use url::Url;

#[derive(Parser, Clone)]
pub struct Config {
    #[clap(flatten)]
    pub connector: ConnectorConfig,
    #[clap(flatten)]
    pub callback: CallbackConfig,
    #[clap(flatten)]
    pub automation: AutomationConfig,
}

#[derive(Parser, Clone)]
pub struct ConnectorConfig {
    /// Participant identity this connector negotiates under.
    #[clap(env = "KONTOR_CONNECTOR_ID", default_value = "urn:connector:kontor")]
    pub connector_id: String,
    /// Address the counterparty should send callback messages to.
    #[clap(env = "KONTOR_PUBLIC_ADDRESS", value_parser = parse_url, default_value = "http://localhost:7151/protocol")]
    pub public_address: Url,
}

#[derive(Parser, Clone)]
pub struct CallbackConfig {
    #[clap(env = "KONTOR_CALLBACK_TIMEOUT", value_parser = humantime::parse_duration, default_value = "10s")]
    pub timeout: Duration,
    /// Bearer token attached to outgoing callback requests, if any.
    #[clap(env = "KONTOR_CALLBACK_TOKEN")]
    pub token: Option<String>,
}

#[derive(Parser, Clone)]
pub struct AutomationConfig {
    /// Lets the rule table drive negotiations without operator calls.
    #[clap(env = "KONTOR_AUTO_NEGOTIATION", action = clap::ArgAction::Set, default_value = "false")]
    pub enabled: bool,
    /// Pending state changes the negotiation driver can hold before it
    /// starts dropping them.
    #[clap(env = "KONTOR_AUTOMATION_QUEUE_SIZE", default_value = "256")]
    pub queue_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Config, clap::Error> {
        // Empty command line arguments, because we want to use ENV fallback
        // or default values if ENV variables are not set.
        Config::try_parse_from([""])
    }
}

fn parse_url(s: &str) -> Result<Url, anyhow::Error> {
    Ok(Url::parse(s)?)
}
