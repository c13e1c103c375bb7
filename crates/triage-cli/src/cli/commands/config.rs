//! Config command handlers.

use anyhow::Result;
use triage_core::client::resolve_base_url;
use triage_core::config::{self, Config};

pub fn path() -> Result<()> {
    println!("{}", config::paths::config_path().display());
    Ok(())
}

pub fn init() -> Result<()> {
    let path = config::paths::config_path();
    Config::init(&path)?;
    println!("Created config at {}", path.display());
    Ok(())
}

pub fn show(config: &Config, base_url_override: Option<&str>) -> Result<()> {
    let base_url = match base_url_override {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => resolve_base_url(config.effective_base_url())?,
    };
    println!("config path: {}", config::paths::config_path().display());
    println!("base url: {base_url}");
    Ok(())
}
