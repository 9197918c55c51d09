//! `issuedesk session`: create, list, select, show and delete sessions.

use anyhow::Result;
use console::style;

use super::App;
use crate::SessionCommands;
use issuedesk::ui::icons::CHECK;
use issuedesk::ui::card_line;

pub async fn cmd_session(app: &App, command: SessionCommands) -> Result<()> {
    let client = app.authed_client()?;

    match command {
        SessionCommands::New { repo, title } => {
            let repository = app.repository(repo.as_deref())?;
            let session = client
                .create_session(&repository, title.as_deref())
                .await?;
            app.store
                .update(|state| state.active_session_id = Some(session.id.clone()))?;
            println!(
                "{}Created session {} on {}",
                CHECK,
                style(&session.id).bold(),
                session.repository
            );
        }
        SessionCommands::List => {
            let sessions = client.list_sessions().await?;
            if sessions.is_empty() {
                println!("No sessions yet. Create one with `issuedesk session new`.");
                return Ok(());
            }
            let active = app.state()?.active_session_id;
            for session in &sessions {
                let marker = if active.as_deref() == Some(session.id.as_str()) {
                    style("*").green().bold()
                } else {
                    style(" ")
                };
                println!(
                    "{} {} {} {} {}",
                    marker,
                    style(&session.id).bold(),
                    session.repository,
                    session.title.as_deref().unwrap_or("(untitled)"),
                    style(session.updated_at.format("%Y-%m-%d %H:%M")).dim()
                );
            }
        }
        SessionCommands::Use { session_id } => {
            let session = client.get_session(&session_id).await?;
            app.store
                .update(|state| state.active_session_id = Some(session.id.clone()))?;
            println!("{}Active session is now {}", CHECK, style(&session.id).bold());
        }
        SessionCommands::Show { session_id } => {
            let id = app.session_id(session_id.as_deref())?;
            let session = client.get_session(&id).await?;
            let cards = client.list_context_cards(&id).await?;
            let stats = &session.statistics;

            println!();
            println!("{}", style(session.title.as_deref().unwrap_or("(untitled)")).bold());
            println!("  id:         {}", session.id);
            println!("  repository: {}", session.repository);
            println!("  created:    {}", session.created_at.format("%Y-%m-%d %H:%M"));
            println!("  messages:   {}", stats.message_count);
            println!("  tokens:     {}", stats.token_count);
            println!("  cost:       ${:.4}", stats.total_cost);
            if !session.embedded_files.is_empty() {
                println!("  files:");
                for file in &session.embedded_files {
                    println!("    {}", file);
                }
            }
            if !cards.is_empty() {
                println!();
                for card in &cards {
                    println!("{}", card_line(card));
                }
            }
        }
        SessionCommands::Delete { session_id, force } => {
            if !force && !app.confirm(&format!("Delete session {}?", session_id))? {
                println!("Cancelled.");
                return Ok(());
            }
            client.delete_session(&session_id).await?;
            app.store.update(|state| {
                if state.active_session_id.as_deref() == Some(session_id.as_str()) {
                    state.active_session_id = None;
                }
            })?;
            println!("{}Deleted session {}", CHECK, session_id);
        }
    }

    Ok(())
}
