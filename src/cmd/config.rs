//! `issuedesk config`: view, validate and initialize configuration.

use anyhow::{Context, Result, bail};
use console::style;

use super::App;
use crate::ConfigCommands;
use issuedesk::IssuedeskConfig;
use issuedesk::ui::icons::{CHECK, WARN};

pub fn cmd_config(app: &App, command: Option<ConfigCommands>) -> Result<()> {
    let path = app.config_path.clone().or_else(IssuedeskConfig::default_path);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Issuedesk Configuration");
            println!("=======================");
            println!();

            match &path {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                Some(path) => println!("No issuedesk.toml at {} (using defaults)", path.display()),
                None => println!("No config directory available (using defaults)"),
            }
            println!("State file:  {}", app.store.path().display());
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!();
            print!("{}", app.config.to_toml_string()?);
            println!();
            println!("WebSocket base: {}", app.config.server.ws_base());
        }
        Some(ConfigCommands::Validate) => {
            let warnings = app.config.validate();
            if warnings.is_empty() {
                println!("{}Configuration is valid", CHECK);
            } else {
                for warning in &warnings {
                    println!("{}{}", WARN, style(warning).yellow());
                }
                println!();
                println!("{} warning(s)", warnings.len());
            }
        }
        Some(ConfigCommands::Init) => {
            let Some(path) = path else {
                bail!("Could not determine the user config directory; pass --config PATH");
            };
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let content = IssuedeskConfig::default().to_toml_string()?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}Wrote {}", CHECK, path.display());
        }
    }

    Ok(())
}
