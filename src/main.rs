use heartline::{config::Config, models::Role, App};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let app = App::new(config)?;
    info!("Ready. Type a message, or /admin, /history, /purge, /memory, /instructions");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = handle_line(&app, line).await {
            error!("{}", e);
            println!("❌ {}", e);
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

async fn handle_line(app: &App, line: &str) -> anyhow::Result<()> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/admin" => {
            println!("{}", app.chat().respond(rest, Role::Admin).await);
        }
        "/history" => {
            let limit = app.config.history_display_limit;
            for record in app.chat().recent_history(limit).await {
                println!(
                    "[{}] U: {}\n    B: {}",
                    record.timestamp, record.message, record.response
                );
            }
        }
        "/purge" => {
            let range = if rest.is_empty() { "all" } else { rest };
            let report = app.repair().delete_old_by_name(range).await?;
            println!("{}", report.message);
        }
        "/memory" => {
            let document = app.admin().memory().await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        "/instructions" => {
            app.admin().set_instructions(rest).await?;
            println!("✅ Instructions saved");
        }
        _ => {
            println!("{}", app.chat().respond(line, Role::Companion).await);
        }
    }
    Ok(())
}
