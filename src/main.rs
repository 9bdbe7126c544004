use anyhow::{Context, Result};
use chrono::{Duration, Local};
use ducktape_scheduler::calendar::{parse_date, MemoryEventStore};
use ducktape_scheduler::config::StoreBackend;
use ducktape_scheduler::parser::KeywordClassifier;
use ducktape_scheduler::{
    extract_datetime, init_logger, AgentSettings, CalendarAgent, Config, EventStore, JsonEventStore,
};
use log::{error, info};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;

/// Command line split into a command and its arguments, honouring double quotes
#[derive(Debug)]
struct CommandArgs {
    command: String,
    args: Vec<String>,
}

impl CommandArgs {
    fn parse(input: &str) -> Option<Self> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;

        for c in input.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    if !in_quotes && !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                ' ' if !in_quotes => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }

        if parts.is_empty() {
            return None;
        }
        let command = parts.remove(0);
        Some(CommandArgs { command, args: parts })
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn EventStore>> {
    match config.storage.backend {
        StoreBackend::Memory => {
            info!("Using in-memory event store");
            Ok(Arc::new(MemoryEventStore::new()))
        }
        StoreBackend::Json => {
            let dir = config.state_dir()?;
            let store = JsonEventStore::new(&dir)
                .with_context(|| format!("Failed to open event store in {}", dir.display()))?;
            Ok(Arc::new(store))
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  parse <text>              - Show the time window found in <text>");
    println!("  slots <YYYY-MM-DD> [min]  - Free whole-hour slots on a day (default 60 minutes)");
    println!("  reset                     - Drop the current conversation");
    println!("  help                      - Show this help");
    println!("  exit                      - Exit the application");
    println!("Anything else is sent to the scheduling assistant, e.g. 明天下午3点开会");
}

async fn process_line(agent: &mut CalendarAgent, line: &str) -> Result<()> {
    let now = Local::now().naive_local();
    let Some(args) = CommandArgs::parse(line) else {
        return Ok(());
    };

    match args.command.as_str() {
        "help" => print_help(),
        "reset" => {
            agent.reset();
            println!("Conversation reset.");
        }
        "parse" => {
            let text = args.args.join(" ");
            match extract_datetime(&text, now) {
                Some(window) => println!("{}", window),
                None => println!("No time found in '{}'", text),
            }
        }
        "slots" => {
            let Some(date) = args.args.first() else {
                println!("Usage: slots <YYYY-MM-DD> [minutes]");
                return Ok(());
            };
            let date = parse_date(date)?;
            let minutes = match args.args.get(1) {
                Some(m) => m.parse::<i64>().context("Duration must be a number of minutes")?,
                None => 60,
            };
            let slots = agent.resolver().available_slots(date, Duration::minutes(minutes)).await?;
            if slots.is_empty() {
                println!("No free slots on {}", date);
            }
            for slot in slots {
                println!("  {}", slot.format("%H:%M"));
            }
        }
        _ => {
            let reply = agent.process_input(line, now).await?;
            println!("{}", reply);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    info!("Starting DuckTape Scheduler");

    let config = Config::load()?;
    let store = open_store(&config)?;
    let settings = AgentSettings::from_config(&config)?;
    let mut agent = CalendarAgent::new(store, Box::new(KeywordClassifier::new()), settings);

    let mut rl = DefaultEditor::new()?;
    println!("Welcome to DuckTape Scheduler! Type 'help' for commands.");

    loop {
        let readline = rl.readline(">> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                if matches!(line, "exit" | "quit") {
                    break;
                }
                if let Err(err) = process_line(&mut agent, line).await {
                    error!("Failed to process input: {:?}", err);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}
