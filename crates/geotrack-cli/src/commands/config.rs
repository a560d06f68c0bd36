//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::format::FormatOptions;
use crate::style;

/// TOML for `config show`, with the maps key masked.
pub fn render_config(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if shown.maps.api_key.is_some() {
        shown.maps.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown).context("Failed to serialize config")
}

pub fn cmd_config(action: &ConfigAction, path: &Path, opts: &FormatOptions) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load(path)?.with_env_overrides();
            print!("{}", render_config(&config)?);
            for error in config.validation_errors() {
                eprintln!("{}", style::format_warning(&error.to_string(), opts.no_color));
            }
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Config::default().save(path)?;
            eprintln!(
                "{}",
                style::format_success(
                    &format!("Wrote default config to {}", path.display()),
                    opts.no_color
                )
            );
        }
    }
    Ok(())
}
