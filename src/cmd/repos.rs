//! Repository and branch listing.

use anyhow::{Context, Result};
use console::style;

use super::App;
use issuedesk::ui::icons::CHECK;
use issuedesk::ui::{spinner, truncate};
use issuedesk_common::Repository;

pub async fn cmd_repos(app: &App, select: Option<&str>) -> Result<()> {
    let client = app.authed_client()?;

    let pb = spinner("Fetching repositories...");
    let repos = client.list_repos().await;
    pb.finish_and_clear();
    let repos = repos?;

    if let Some(slug) = select {
        // Without an explicit @branch, use the repository's default branch.
        let default_branch = slug
            .split_once('@')
            .map(|_| "main".to_string())
            .or_else(|| {
                repos
                    .iter()
                    .find(|r| format!("{}/{}", r.owner, r.name) == slug)
                    .map(|r| r.default_branch.clone())
            })
            .unwrap_or_else(|| "main".to_string());
        let repo = Repository::parse(slug, &default_branch)
            .with_context(|| format!("Invalid repository '{}'; expected owner/name[@branch]", slug))?;
        app.store
            .update(|state| state.selected_repository = Some(repo.clone()))?;
        println!("{}Selected {}", CHECK, style(&repo).bold());
        return Ok(());
    }

    if repos.is_empty() {
        println!("No repositories visible to this account.");
        return Ok(());
    }

    let selected = app.state()?.selected_repository.map(|r| r.full_name());
    for repo in &repos {
        let full = format!("{}/{}", repo.owner, repo.name);
        let marker = if selected.as_deref() == Some(full.as_str()) {
            style("*").green().bold()
        } else {
            style(" ")
        };
        let mut line = format!("{} {} {}", marker, style(&full).bold(), style(&repo.default_branch).dim());
        if repo.private {
            line.push_str(&format!(" {}", style("private").yellow()));
        }
        if let Some(desc) = &repo.description {
            line.push_str(&format!("  {}", style(truncate(desc, 60)).dim()));
        }
        println!("{}", line);
    }
    Ok(())
}

pub async fn cmd_branches(app: &App, repo: Option<&str>) -> Result<()> {
    let repository = app.repository(repo)?;
    let client = app.authed_client()?;
    let branches = client
        .list_branches(&repository.owner, &repository.name)
        .await?;

    for branch in &branches {
        let marker = if branch.name == repository.branch { "*" } else { " " };
        if branch.protected {
            println!("{} {} {}", marker, branch.name, style("protected").dim());
        } else {
            println!("{} {}", marker, branch.name);
        }
    }
    Ok(())
}
