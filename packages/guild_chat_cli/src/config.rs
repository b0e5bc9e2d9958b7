use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use guild_chat::ChatConfig;

/// Build a figment that layers: defaults → config file → GUILD_CHAT_* env vars.
///
/// Nested keys use `__` in env vars, e.g. `GUILD_CHAT_CONNECTION__MAX_RETRIES=3`.
/// A missing config file is not an error; the defaults apply.
pub fn load_config(path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ChatConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("GUILD_CHAT_").split("__"))
}

pub fn resolve(path: Option<&Path>) -> anyhow::Result<ChatConfig> {
    Ok(load_config(path).extract()?)
}
