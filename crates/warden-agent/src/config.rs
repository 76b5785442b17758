use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use serde::Deserialize;
use warden_process::GameConfig;

pub const DEFAULT_COMMAND_PREFIX: &str = "!";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Shown to players on the status embed.
    #[serde(default)]
    pub password: String,
    // Kept raw so one malformed entry does not reject the whole file.
    #[serde(default)]
    games: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    /// When set, commands from any other channel are ignored.
    #[serde(default)]
    pub channel_id: Option<u64>,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel_id: None,
            command_prefix: default_prefix(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg = Self::parse(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.apply_token_override(std::env::var("WARDEN_DISCORD_TOKEN").ok());
        if cfg.discord.token.trim().is_empty() {
            anyhow::bail!("discord token missing (set discord.token or WARDEN_DISCORD_TOKEN)");
        }
        Ok(cfg)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut cfg: Self = serde_yaml::from_str(text)?;
        if cfg.discord.command_prefix.is_empty() {
            cfg.discord.command_prefix = default_prefix();
        }
        Ok(cfg)
    }

    fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.map(|t| t.trim().to_string())
            && !token.is_empty()
        {
            self.discord.token = token;
        }
    }

    /// Game entries that deserialise; the rest are logged and dropped here,
    /// and incomplete ones are dropped by the registry.
    pub fn games(&self) -> Vec<(String, GameConfig)> {
        self.games
            .iter()
            .filter_map(|(key, raw)| {
                match serde_yaml::from_value::<GameConfig>(raw.clone()) {
                    Ok(cfg) => Some((key.clone(), cfg)),
                    Err(e) => {
                        tracing::error!(game = %key, error = %e, "malformed game entry; skipping");
                        None
                    }
                }
            })
            .collect()
    }
}
