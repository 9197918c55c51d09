//! Login, logout and identity commands.

use anyhow::{Context, Result};
use console::style;

use super::App;
use issuedesk::ui::icons::{CHECK, WARN};

pub async fn cmd_login(
    app: &App,
    with_token: Option<&str>,
    code: Option<&str>,
    no_browser: bool,
) -> Result<()> {
    let client = app.client()?;

    let token = match with_token {
        Some(token) => token.trim().to_string(),
        None => {
            let code = match code {
                Some(code) => code.to_string(),
                None => prompt_for_code(&client, no_browser).await?,
            };
            client
                .exchange_code(code.trim(), None)
                .await
                .context("Failed to exchange authorization code")?
                .token
        }
    };

    let profile = client
        .clone()
        .with_token(token.clone())
        .profile()
        .await
        .context("The backend rejected the token")?;

    app.store.update(|state| state.auth_token = Some(token))?;
    tracing::info!(user = %profile.login, "logged in");

    println!("{}Logged in as {}", CHECK, style(&profile.login).bold());
    Ok(())
}

async fn prompt_for_code(client: &issuedesk::ApiClient, no_browser: bool) -> Result<String> {
    use dialoguer::Input;

    let login = client.login_url().await?;
    println!("Authorize issuedesk with GitHub:");
    println!("  {}", style(&login.url).underlined());
    println!();
    if !no_browser && open::that(&login.url).is_err() {
        println!("{}Could not open a browser; open the URL above manually", WARN);
    }

    let code: String = Input::new()
        .with_prompt("Paste the code shown after authorizing")
        .interact_text()
        .context("Failed to read authorization code")?;
    Ok(code)
}

pub async fn cmd_logout(app: &App) -> Result<()> {
    let state = app.state()?;
    if let Some(token) = state.auth_token.clone() {
        let client = app.client()?.with_token(token);
        // The local token is dropped regardless of what the backend says.
        if let Err(e) = client.logout().await {
            tracing::warn!(error = %e, "backend logout failed");
        }
    }

    app.store.update(|state| {
        state.auth_token = None;
        state.active_session_id = None;
    })?;
    println!("{}Logged out", CHECK);
    Ok(())
}

pub async fn cmd_whoami(app: &App) -> Result<()> {
    let client = app.authed_client()?;
    let profile = client.profile().await?;
    let state = app.state()?;

    match &profile.name {
        Some(name) => println!("{} ({})", style(&profile.login).bold(), name),
        None => println!("{}", style(&profile.login).bold()),
    }
    println!("API:        {}", client.base_url());
    match &state.selected_repository {
        Some(repo) => println!("Repository: {}", repo),
        None => println!("Repository: {}", style("none selected").dim()),
    }
    match &state.active_session_id {
        Some(id) => println!("Session:    {}", id),
        None => println!("Session:    {}", style("none").dim()),
    }
    Ok(())
}
