//! Context cards, file dependencies and issue drafting.

use anyhow::{Context, Result, anyhow, bail};
use console::style;

use super::App;
use crate::{CardsCommands, DepsCommands};
use issuedesk::ui::icons::{CHECK, SPARKLE};
use issuedesk::ui::{card_line, spinner};
use issuedesk_common::{CardSource, FileDependency, NewContextCard};

pub async fn cmd_cards(app: &App, command: Option<CardsCommands>) -> Result<()> {
    let session_id = app.session_id(None)?;
    let client = app.authed_client()?;

    match command {
        None | Some(CardsCommands::List) => {
            let cards = client.list_context_cards(&session_id).await?;
            if cards.is_empty() {
                println!("No context cards in this session.");
                return Ok(());
            }
            let total: u64 = cards.iter().map(|c| c.token_count).sum();
            for card in &cards {
                println!("{}", card_line(card));
            }
            println!();
            println!("{} card(s), {} tokens", cards.len(), total);
        }
        Some(CardsCommands::Add {
            title,
            content,
            file,
            description,
            source,
        }) => {
            let source: CardSource = source.parse().map_err(|e: String| anyhow!(e))?;
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Provide the card body with --content or --file"),
            };
            if content.trim().is_empty() {
                bail!("Card content is empty");
            }

            let card = client
                .add_context_card(
                    &session_id,
                    &NewContextCard {
                        title,
                        description,
                        content,
                        source,
                    },
                )
                .await?;
            println!("{}Added card", CHECK);
            println!("{}", card_line(&card));
        }
        Some(CardsCommands::Remove { card_id }) => {
            client.remove_context_card(&session_id, &card_id).await?;
            println!("{}Removed card {}", CHECK, card_id);
        }
    }

    Ok(())
}

pub async fn cmd_deps(app: &App, command: Option<DepsCommands>) -> Result<()> {
    let session_id = app.session_id(None)?;
    let client = app.authed_client()?;

    let deps = match command {
        Some(DepsCommands::Extract { paths }) => {
            let pb = spinner(format!("Extracting dependencies of {} file(s)...", paths.len()));
            let result = client.extract_dependencies(&session_id, &paths).await;
            pb.finish_and_clear();
            result?
        }
        None | Some(DepsCommands::List) => client.list_dependencies(&session_id).await?,
    };

    if deps.is_empty() {
        println!("No dependencies recorded.");
        return Ok(());
    }
    for dep in &deps {
        print_dependency(dep);
    }
    Ok(())
}

fn print_dependency(dep: &FileDependency) {
    println!(
        "{} {}",
        style(&dep.path).bold(),
        style(format!("({} tokens)", dep.token_count)).dim()
    );
    for import in &dep.imports {
        println!("  -> {}", import);
    }
    for importer in &dep.imported_by {
        println!("  <- {}", style(importer).dim());
    }
}

pub async fn cmd_issue(app: &App, github: bool) -> Result<()> {
    let session_id = app.session_id(None)?;
    let client = app.authed_client()?;

    let pb = spinner("Drafting issue...");
    let issue = client.create_issue(&session_id, github).await;
    pb.finish_and_clear();
    let issue = issue?;

    println!();
    println!("{}{}", SPARKLE, style(&issue.title).bold());
    if !issue.labels.is_empty() {
        println!("{}", style(format!("labels: {}", issue.labels.join(", "))).dim());
    }
    println!();
    println!("{}", issue.body);
    println!();

    match (&issue.github_issue_number, &issue.html_url) {
        (Some(number), Some(url)) => println!("{}Opened #{} {}", CHECK, number, style(url).underlined()),
        (Some(number), None) => println!("{}Opened #{}", CHECK, number),
        _ if github => println!("{}", style("The backend did not report a GitHub issue").yellow()),
        _ => println!(
            "{}",
            style("Draft only; rerun with --github to open it on GitHub").dim()
        ),
    }
    Ok(())
}
