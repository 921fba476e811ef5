//! protorpc-cli - call protorpc methods from the command line
//!
//! Requests and responses are JSON; the reply is printed to stdout.

use clap::{Parser, Subcommand};
use protorpc_client::{Client, ClientConfig};
use protorpc_protocol::{Env, DEFAULT_PORT};
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protorpc-cli")]
#[command(about = "Command-line caller for protorpc services")]
#[command(version)]
struct Cli {
    /// Server host
    #[arg(long, env = "PROTORPC_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, env = "PROTORPC_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Dial timeout in milliseconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a method once
    Call {
        /// Method name, e.g. ArithService.Add
        method: String,

        /// Request JSON (or @file.json to read from file); defaults to `{}`
        request: Option<String>,

        /// Print the reply on one line
        #[arg(long)]
        compact: bool,
    },

    /// Call a method repeatedly on one connection and report timing
    Repeat {
        /// Method name
        method: String,

        /// Request JSON (or @file.json)
        request: Option<String>,

        /// Number of calls
        #[arg(short = 'n', long, default_value_t = 100)]
        count: u32,
    },
}

fn parse_request(arg: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    let Some(arg) = arg else {
        return Ok(Value::Object(Default::default()));
    };
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::new(cli.host, cli.port);
    if let Some(ms) = cli.connect_timeout {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }
    let mut client = Client::new(config, Env::current("protorpc-cli"));

    match cli.command {
        Commands::Call {
            method,
            request,
            compact,
        } => {
            let request = parse_request(request.as_deref())?;
            match client.call::<Value, Value>(&method, &request).await {
                Ok(reply) => {
                    let out = if compact {
                        serde_json::to_string(&reply)?
                    } else {
                        serde_json::to_string_pretty(&reply)?
                    };
                    println!("{}", out);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    client.close().await;
                    std::process::exit(1);
                }
            }
        }
        Commands::Repeat {
            method,
            request,
            count,
        } => {
            let request = parse_request(request.as_deref())?;
            let start = std::time::Instant::now();
            let mut failed = 0u32;
            for _ in 0..count {
                if let Err(e) = client.call::<Value, Value>(&method, &request).await {
                    tracing::debug!("call failed: {}", e);
                    if e.is_stream_fatal() || e.is_retryable() {
                        eprintln!("Error: {}", e);
                        client.close().await;
                        std::process::exit(1);
                    }
                    failed += 1;
                }
            }
            let elapsed = start.elapsed();
            println!(
                "{} calls ({} failed) in {:.3?}, {:.1} calls/s",
                count,
                failed,
                elapsed,
                f64::from(count) / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }
    }

    client.close().await;
    Ok(())
}
