use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use issuedesk::IssuedeskConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "issuedesk")]
#[command(version, about = "Chat with your repository, draft GitHub issues, and watch agents solve them")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, global = true)]
    pub yes: bool,

    /// Path to issuedesk.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend API base URL. Overrides issuedesk.toml and ISSUEDESK_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Bearer token. Overrides the stored login.
    #[arg(long, global = true, env = "ISSUEDESK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to the local state file
    #[arg(long, global = true, hide = true, env = "ISSUEDESK_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authorize with GitHub through the backend
    Login {
        /// Store this token instead of running the browser flow
        #[arg(long)]
        with_token: Option<String>,

        /// Authorization code from the callback page
        #[arg(long)]
        code: Option<String>,

        /// Print the authorization URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Forget the stored token
    Logout,
    /// Show the logged-in user and the active session
    Whoami,
    /// List repositories, or select one for new sessions
    Repos {
        /// Remember owner/name[@branch] as the selected repository
        #[arg(long)]
        select: Option<String>,
    },
    /// List branches of a repository (defaults to the selected one)
    Branches { repo: Option<String> },
    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Send a message, or start an interactive chat when none is given
    Chat {
        message: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },
    /// Manage context cards of the active session
    Cards {
        #[command(subcommand)]
        command: Option<CardsCommands>,
    },
    /// Extract or list file dependencies of the active session
    Deps {
        #[command(subcommand)]
        command: Option<DepsCommands>,
    },
    /// Draft an issue from the active session
    Issue {
        /// Also open the issue on GitHub
        #[arg(long)]
        github: bool,
    },
    /// Follow live updates of a session until interrupted
    Watch {
        #[arg(long)]
        session: Option<String>,
    },
    /// Start, cancel or inspect agent runs for an issue
    Solve {
        #[command(subcommand)]
        command: SolveCommands,
    },
    /// Stream one run's trajectory as it grows
    Trajectory { solve_id: String, run_id: String },
    /// Poll every run of a solve session until all have finished
    Arena { solve_id: String },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum SessionCommands {
    /// Create a session and make it active
    New {
        /// owner/name[@branch]; defaults to the selected repository
        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        title: Option<String>,
    },
    /// List sessions
    List,
    /// Make a session active
    Use { session_id: String },
    /// Show a session (defaults to the active one)
    Show { session_id: Option<String> },
    /// Delete a session
    Delete {
        session_id: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum CardsCommands {
    /// List context cards
    List,
    /// Add a context card from inline text or a file
    Add {
        title: String,

        #[arg(long, conflicts_with = "file")]
        content: Option<String>,

        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long, default_value = "")]
        description: String,

        /// chat, file, github or manual
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Remove a context card
    Remove { card_id: String },
}

#[derive(Subcommand, Clone)]
pub enum DepsCommands {
    /// Extract dependencies for the given repository paths
    Extract {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List extracted dependencies
    List,
}

#[derive(Subcommand, Clone)]
pub enum SolveCommands {
    /// Start agent runs for an issue
    Start {
        #[arg(long)]
        title: String,

        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,

        #[arg(long)]
        body_file: Option<PathBuf>,

        /// Model to run; repeat for an arena of several
        #[arg(long = "model", required = true)]
        models: Vec<String>,

        #[arg(long)]
        strategy: Option<String>,

        /// owner/name[@branch]; defaults to the selected repository
        #[arg(long)]
        repo: Option<String>,

        /// Poll the runs until they finish
        #[arg(long)]
        watch: bool,
    },
    /// Cancel a solve session
    Cancel { solve_id: String },
    /// Show the status of every run
    Status { solve_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default issuedesk.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // `config init` creates the file that `load` would otherwise require.
    let init = matches!(
        cli.command,
        Commands::Config {
            command: Some(ConfigCommands::Init)
        }
    );
    let mut config = if init {
        IssuedeskConfig::default()
    } else {
        IssuedeskConfig::load(cli.config.as_deref())?
    };
    config.apply_cli(cli.api_url.as_deref(), cli.verbose);
    issuedesk::logging::init(&config.logging)?;

    let app = cmd::App::new(&cli, config)?;

    match &cli.command {
        Commands::Login {
            with_token,
            code,
            no_browser,
        } => cmd::cmd_login(&app, with_token.as_deref(), code.as_deref(), *no_browser).await?,
        Commands::Logout => cmd::cmd_logout(&app).await?,
        Commands::Whoami => cmd::cmd_whoami(&app).await?,
        Commands::Repos { select } => cmd::cmd_repos(&app, select.as_deref()).await?,
        Commands::Branches { repo } => cmd::cmd_branches(&app, repo.as_deref()).await?,
        Commands::Session { command } => cmd::cmd_session(&app, command.clone()).await?,
        Commands::Chat { message, session } => {
            cmd::cmd_chat(&app, message.as_deref(), session.as_deref()).await?
        }
        Commands::Cards { command } => cmd::cmd_cards(&app, command.clone()).await?,
        Commands::Deps { command } => cmd::cmd_deps(&app, command.clone()).await?,
        Commands::Issue { github } => cmd::cmd_issue(&app, *github).await?,
        Commands::Watch { session } => cmd::cmd_watch(&app, session.as_deref()).await?,
        Commands::Solve { command } => cmd::cmd_solve(&app, command.clone()).await?,
        Commands::Trajectory { solve_id, run_id } => {
            cmd::cmd_trajectory(&app, solve_id, run_id).await?
        }
        Commands::Arena { solve_id } => cmd::cmd_arena(&app, solve_id).await?,
        Commands::Config { command } => cmd::cmd_config(&app, command.clone())?,
    }

    Ok(())
}
