//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                          |
//! |-----------|-------------------------------------------|
//! | `auth`    | `Login`, `Logout`, `Whoami`               |
//! | `repos`   | `Repos`, `Branches`                       |
//! | `session` | `Session`                                 |
//! | `chat`    | `Chat`, `Watch`                           |
//! | `cards`   | `Cards`, `Deps`, `Issue`                  |
//! | `solve`   | `Solve`, `Trajectory`, `Arena`            |
//! | `config`  | `Config`                                  |

pub mod auth;
pub mod cards;
pub mod chat;
pub mod config;
pub mod repos;
pub mod session;
pub mod solve;

pub use auth::{cmd_login, cmd_logout, cmd_whoami};
pub use cards::{cmd_cards, cmd_deps, cmd_issue};
pub use chat::{cmd_chat, cmd_watch};
pub use config::cmd_config;
pub use repos::{cmd_branches, cmd_repos};
pub use session::cmd_session;
pub use solve::{cmd_arena, cmd_solve, cmd_trajectory};

use std::path::PathBuf;

use anyhow::{Context, Result};
use issuedesk::errors::ClientError;
use issuedesk::{ApiClient, IssuedeskConfig, LocalState, StateStore};
use issuedesk_common::Repository;

use crate::Cli;

/// Everything a command needs: effective config, persisted state and the
/// global flags.
pub struct App {
    pub config: IssuedeskConfig,
    pub config_path: Option<PathBuf>,
    pub store: StateStore,
    pub token_override: Option<String>,
    pub yes: bool,
}

impl App {
    pub fn new(cli: &Cli, config: IssuedeskConfig) -> Result<Self> {
        let store = match &cli.state_file {
            Some(path) => StateStore::new(path),
            None => StateStore::default_location()
                .context("Could not determine the user config directory; pass --state-file")?,
        };
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            store,
            token_override: cli.token.clone().filter(|t| !t.is_empty()),
            yes: cli.yes,
        })
    }

    pub fn state(&self) -> Result<LocalState> {
        self.store.load()
    }

    /// `--token` / `ISSUEDESK_TOKEN`, else the stored login.
    pub fn token(&self) -> Result<String> {
        if let Some(token) = &self.token_override {
            return Ok(token.clone());
        }
        self.state()?
            .auth_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Unauthorized.into())
    }

    /// Client without requiring a login (auth endpoints).
    pub fn client(&self) -> Result<ApiClient> {
        let token = self.token().ok();
        Ok(ApiClient::new(&self.config.server, token)?)
    }

    pub fn authed_client(&self) -> Result<ApiClient> {
        let token = self.token()?;
        Ok(ApiClient::new(&self.config.server, Some(token))?)
    }

    pub fn session_id(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(id) = explicit {
            return Ok(id.to_string());
        }
        self.state()?
            .active_session_id
            .ok_or_else(|| ClientError::NoActiveSession.into())
    }

    pub fn repository(&self, explicit: Option<&str>) -> Result<Repository> {
        match explicit {
            Some(slug) => Repository::parse(slug, "main")
                .with_context(|| format!("Invalid repository '{}'; expected owner/name[@branch]", slug)),
            None => self.state()?.selected_repository.context(
                "No repository selected; pass --repo owner/name or run `issuedesk repos --select owner/name`",
            ),
        }
    }

    /// `--yes` answers every prompt.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}
