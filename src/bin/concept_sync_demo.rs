//! concept-sync demo
//!
//! Runs one request against the reference messaging app and prints the
//! outcome as JSON. Logs go to stderr and are filtered with `RUST_LOG`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use concept_sync::app::syncs::SEND_PATH;
use concept_sync::app::App;
use concept_sync::value::record_from_json;
use concept_sync::{record, EngineConfig, RequestOutcome, SyncError, Value};

/// Demo configuration
struct Config {
    path: String,
    body: serde_json::Value,
    max_depth: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: SEND_PATH.to_string(),
            body: serde_json::json!({ "content": "Hi @Amimi, how are we doing?" }),
            max_depth: None,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--path" => {
                if i + 1 < args.len() {
                    config.path.clone_from(&args[i + 1]);
                    i += 2;
                } else {
                    eprintln!("error: --path requires a value");
                    std::process::exit(1);
                }
            }
            "--body" => {
                if i + 1 < args.len() {
                    config.body = serde_json::from_str(&args[i + 1]).unwrap_or_else(|e| {
                        eprintln!("error: invalid JSON body: {e}");
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("error: --body requires a value");
                    std::process::exit(1);
                }
            }
            "--max-depth" => {
                if i + 1 < args.len() {
                    let depth: u32 = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid depth: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    config.max_depth = Some(depth);
                    i += 2;
                } else {
                    eprintln!("error: --max-depth requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("concept-sync-demo - run one request through the messaging app");
                println!();
                println!("USAGE:");
                println!("    concept-sync-demo [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("        --path <PATH>         Request path [default: {SEND_PATH}]");
                println!("        --body <JSON>         Request body; session and conversation are filled in when absent");
                println!("        --max-depth <N>       Maximum cascade depth [default: 32]");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

fn seed_output(outcome: &RequestOutcome, name: &str) -> Result<Value, SyncError> {
    outcome
        .trace
        .get(0)
        .and_then(|e| e.outcome.output())
        .and_then(|o| o.get(name))
        .cloned()
        .ok_or_else(|| SyncError::internal(format!("seed action returned no {name}")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = parse_args();

    let mut config = EngineConfig::default();
    if let Some(depth) = args.max_depth {
        config.max_cascade_depth = depth;
    }

    let app = App::default();
    let engine = app.engine(config)?;

    // Seed a session for alice and a conversation she shares with the assistant.
    let session = engine
        .invoke("Sessioning", "create", record! { "user" => "alice" })
        .await?;
    let session = seed_output(&session, "session")?;
    let conversation = engine
        .invoke(
            "Conversing",
            "create",
            record! {
                "title" => "demo",
                "participants" => vec![Value::from("alice"), Value::from("amimi")],
            },
        )
        .await?;
    let conversation = seed_output(&conversation, "conversation")?;

    let mut body = record_from_json(args.body)
        .ok_or_else(|| SyncError::internal("--body must be a JSON object"))?;
    body.entry("session".to_string()).or_insert(session);
    body.entry("conversation".to_string()).or_insert(conversation);

    let outcome = engine.submit_request(&args.path, body).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
