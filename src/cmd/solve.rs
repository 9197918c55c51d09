//! Agent runs: starting them, streaming one, polling many.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;

use super::App;
use crate::SolveCommands;
use issuedesk::trajectory::{ArenaPoller, ArenaSnapshot, StreamPhase, TrajectoryStream};
use issuedesk::ui::icons::{CHECK, CROSS, SPARKLE};
use issuedesk::ui::{ArenaUI, entry_line, run_summary, spinner, status_label, truncate};
use issuedesk_common::{SolveRun, StartSolveRequest};

pub async fn cmd_solve(app: &App, command: SolveCommands) -> Result<()> {
    let client = app.authed_client()?;

    match command {
        SolveCommands::Start {
            title,
            body,
            body_file,
            models,
            strategy,
            repo,
            watch,
        } => {
            let issue_body = read_body(body, body_file)?;
            let repository = app.repository(repo.as_deref())?;
            let request = StartSolveRequest {
                issue_title: title,
                issue_body,
                repository,
                models,
                strategy,
            };

            let pb = spinner("Starting runs...");
            let solve = client.start_solve(&request).await;
            pb.finish_and_clear();
            let solve = solve?;

            println!("{}Solve session {}", SPARKLE, style(&solve.id).bold());
            print_runs(&solve.runs);

            if watch {
                println!();
                poll_arena(app, &solve.id, &solve.runs).await?;
            }
        }
        SolveCommands::Cancel { solve_id } => {
            if !app.confirm(&format!("Cancel every run of {}?", solve_id))? {
                println!("Cancelled.");
                return Ok(());
            }
            client.cancel_solve(&solve_id).await?;
            println!("{}Cancellation requested for {}", CHECK, solve_id);
        }
        SolveCommands::Status { solve_id } => {
            let solve = client.solve_status(&solve_id).await?;
            println!("{} {}", style(&solve.id).bold(), status_label(solve.status));
            print_runs(&solve.runs);
        }
    }

    Ok(())
}

fn read_body(body: Option<String>, body_file: Option<PathBuf>) -> Result<String> {
    match (body, body_file) {
        (Some(body), _) => Ok(body),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => Ok(String::new()),
    }
}

fn print_runs(runs: &[SolveRun]) {
    for run in runs {
        let strategy = run
            .strategy
            .as_deref()
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();
        println!(
            "  {} {}{} {} {}",
            style(&run.id).dim(),
            style(&run.model).bold(),
            strategy,
            status_label(run.status),
            style(format!("{} steps", run.trajectory.entries.len())).dim()
        );
    }
}

pub async fn cmd_trajectory(app: &App, solve_id: &str, run_id: &str) -> Result<()> {
    let client = app.authed_client()?;
    let stream = TrajectoryStream::open(client, solve_id, run_id);
    let mut rx = stream.subscribe();

    let pb = spinner(format!("Connecting to run {}...", run_id));
    let mut printed = 0usize;

    loop {
        {
            let snap = rx.borrow_and_update();
            if snap.phase != StreamPhase::Connecting && snap.phase != StreamPhase::Idle {
                pb.finish_and_clear();
            }
            for (index, entry) in snap.messages.iter().enumerate().skip(printed) {
                pb.suspend(|| println!("{}", entry_line(index, entry)));
            }
            printed = snap.messages.len();
            if snap.phase.is_finished() {
                break;
            }
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                break;
            }
        }
    }
    pb.finish_and_clear();

    let last = stream.finished().await;
    println!();
    match last.phase {
        StreamPhase::Completed => {
            let status = last
                .status
                .map(status_label)
                .unwrap_or_else(|| format!("{}{}", CHECK, style("done").green()));
            println!("{} {}", status, style(format!("{} steps", last.messages.len())).dim());
        }
        StreamPhase::Error => {
            let err = last.error.unwrap_or_else(|| "stream failed".to_string());
            bail!("Trajectory stream for {} ended: {}", run_id, err);
        }
        _ => println!("{}", style("Stopped").dim()),
    }
    if let Some(cost) = last.info.cost {
        println!("cost: ${:.4}", cost);
    }
    if let Some(submission) = &last.info.submission {
        println!("submission:\n{}", submission);
    }
    Ok(())
}

pub async fn cmd_arena(app: &App, solve_id: &str) -> Result<()> {
    let client = app.authed_client()?;
    let solve = client.solve_status(solve_id).await?;
    if solve.runs.is_empty() {
        println!("Solve session {} has no runs.", solve_id);
        return Ok(());
    }
    poll_arena(app, &solve.id, &solve.runs).await
}

async fn poll_arena(app: &App, solve_id: &str, runs: &[SolveRun]) -> Result<()> {
    let client = app.authed_client()?;
    let poller = ArenaPoller::start(
        Arc::new(client),
        solve_id,
        runs,
        app.config.trajectory.poll_interval(),
    );
    let mut rx = poller.subscribe();
    let ui = ArenaUI::new(&poller.snapshot());

    loop {
        ui.update(&rx.borrow_and_update());
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                poller.cancel();
                break;
            }
        }
    }

    let last = poller.finished().await;
    ui.update(&last);
    ui.finish();
    print_arena_summary(&last);
    Ok(())
}

fn print_arena_summary(snapshot: &ArenaSnapshot) {
    println!();
    for run in snapshot.values() {
        println!("{} {}", style(truncate(&run.model, 24)).bold(), run_summary(run));
        if let Some(submission) = &run.info.submission {
            println!("    {}", style(truncate(submission.lines().next().unwrap_or(""), 100)).dim());
        }
    }
    let failed = snapshot
        .values()
        .filter(|run| run.error.is_some())
        .count();
    if failed > 0 {
        println!();
        println!("{}{} run(s) reported fetch errors", CROSS, failed);
    }
}
