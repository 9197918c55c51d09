//! Chat and live session commands.
//!
//! Both commands run a [`SessionContext`] and render its snapshots through a
//! [`SessionPrinter`]. `chat` waits for the assistant after each message;
//! `watch` prints until interrupted.

use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use tokio::sync::watch;

use super::App;
use issuedesk::session::{ConnectionStatus, SessionContext, SessionState};
use issuedesk::ui::icons::{CROSS, SPARKLE};
use issuedesk::ui::{SessionPrinter, message_line, spinner};
use issuedesk_common::{AgentState, MessageRole};

/// Longest wait for an assistant reply before returning to the prompt.
const REPLY_TIMEOUT: Duration = Duration::from_secs(180);

/// History shown when an interactive chat starts.
const HISTORY_LINES: usize = 10;

async fn open_context(app: &App, session: Option<&str>) -> Result<SessionContext> {
    let session_id = app.session_id(session)?;
    let token = app.token()?;
    let client = app.authed_client()?;

    let pb = spinner("Connecting to session...");
    let ctx = SessionContext::open(client, &app.config, &session_id, &token).await;
    pb.finish_and_clear();
    Ok(ctx?)
}

pub async fn cmd_chat(app: &App, message: Option<&str>, session: Option<&str>) -> Result<()> {
    let ctx = open_context(app, session).await?;
    let mut printer = SessionPrinter::primed(&ctx.snapshot());

    let result = match message {
        Some(text) => send_and_wait(&ctx, &mut printer, text).await,
        None => interactive(&ctx, &mut printer).await,
    };

    ctx.shutdown().await;
    result
}

async fn interactive(ctx: &SessionContext, printer: &mut SessionPrinter) -> Result<()> {
    let snapshot = ctx.snapshot();
    println!(
        "{}Chatting in {} {}",
        SPARKLE,
        style(snapshot.title.as_deref().unwrap_or(ctx.session_id())).bold(),
        style("(/quit to leave)").dim()
    );
    let skip = snapshot.messages.len().saturating_sub(HISTORY_LINES);
    for msg in snapshot.messages.iter().skip(skip) {
        println!("{}", message_line(msg));
    }

    loop {
        let line = tokio::task::spawn_blocking(|| {
            dialoguer::Input::<String>::new()
                .with_prompt("you")
                .allow_empty(true)
                .interact_text()
        })
        .await??;

        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            _ => {}
        }
        if let Err(e) = send_and_wait(ctx, printer, line).await {
            println!("{}{}", CROSS, style(e).red());
        }
    }
    Ok(())
}

/// Send one message and print updates until the assistant has answered and
/// gone idle, the connection fails, or the wait times out.
async fn send_and_wait(ctx: &SessionContext, printer: &mut SessionPrinter, text: &str) -> Result<()> {
    let mut rx = ctx.subscribe();
    let baseline = assistant_replies(&rx.borrow());

    if let Err(e) = ctx.send_message(text).await {
        print_changes(printer, &rx.borrow_and_update());
        return Err(e.into());
    }

    let deadline = tokio::time::sleep(REPLY_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        let done = {
            let state = rx.borrow_and_update();
            print_changes(printer, &state);
            if state.connection == ConnectionStatus::Failed {
                bail!("Realtime connection failed; the reply may still arrive later");
            }
            assistant_replies(&state) > baseline && state.agent_status.state == AgentState::Idle
        };
        if done {
            return Ok(());
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = &mut deadline => {
                println!("{}", style("No reply yet; it will show up in `issuedesk watch`").dim());
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

pub async fn cmd_watch(app: &App, session: Option<&str>) -> Result<()> {
    let ctx = open_context(app, session).await?;
    let mut printer = SessionPrinter::primed(&ctx.snapshot());
    let mut rx = ctx.subscribe();

    println!(
        "{}Watching {} {}",
        SPARKLE,
        style(ctx.session_id()).bold(),
        style("(Ctrl-C to stop)").dim()
    );

    let result = watch_until_interrupted(&mut rx, &mut printer).await;
    ctx.shutdown().await;
    result
}

async fn watch_until_interrupted(
    rx: &mut watch::Receiver<SessionState>,
    printer: &mut SessionPrinter,
) -> Result<()> {
    loop {
        {
            let state = rx.borrow_and_update();
            print_changes(printer, &state);
            if state.connection == ConnectionStatus::Failed {
                bail!("Realtime connection failed after all reconnect attempts");
            }
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn print_changes(printer: &mut SessionPrinter, state: &SessionState) {
    for line in printer.diff(state) {
        println!("{}", line);
    }
}

fn assistant_replies(state: &SessionState) -> usize {
    state
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .count()
}
