//! Console front end standing in for the task buttons, cancel buttons,
//! thread-count slider and progress indicator.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use task_families::{EngineConfig, EngineError, Family, TaskRunner};

/// Run Fibonacci and bubble-sort task families on a resizable thread pool
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Initial worker thread count (overrides the config file)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

const HELP: &str = "commands: a <n> | b <n> | cancel a|b | threads <n> | status | quit";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => EngineConfig::load_or_default()?,
    };
    if let Some(threads) = args.threads {
        config = config.with_pool_size(threads);
    }

    let runner = TaskRunner::new(config)?;

    let mut progress = runner.progress();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if *progress.borrow_and_update() {
                println!("[working...]");
            } else {
                println!("[idle]");
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["status"] => print_status(&runner)?,
            ["cancel", family] => match family.parse::<Family>() {
                Ok(family) => {
                    runner.cancel_all(family);
                }
                Err(e) => println!("{}", e),
            },
            ["threads", size] => match size.parse::<usize>() {
                Ok(size) => runner.resize_pool(size)?,
                Err(_) => println!("Thread count must be a non-negative integer"),
            },
            [family, input] => match family.parse::<Family>() {
                Ok(family) => match runner.submit(family, input) {
                    Ok(handle) => info!("Submitted task {} ({})", handle.id(), family),
                    Err(EngineError::Validation(e)) => println!("{}", e),
                    Err(e) => error!("Failed to submit task: {}", e),
                },
                Err(e) => println!("{}", e),
            },
            _ => println!("{}", HELP),
        }
    }

    runner.shutdown();
    Ok(())
}

fn print_status(runner: &TaskRunner) -> Result<()> {
    let snapshots: Vec<_> = Family::ALL
        .iter()
        .map(|family| runner.snapshot(*family))
        .collect();
    let status = serde_json::json!({
        "pool_size": runner.pool_size(),
        "in_progress": runner.in_progress(),
        "families": snapshots,
        "active": runner.active_tasks(),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
