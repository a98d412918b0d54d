use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "worker-probe")]
#[command(about = "Query a worker's health probe endpoint", long_about = None)]
struct Cli {
    #[arg(short, long, env = "MYAPP_PROBE_URL", default_value = "http://localhost:8090")]
    url: String,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness probe (/health)
    Health,
    /// Liveness probe (/healthz)
    Healthz,
    /// Readiness probe (/ready)
    Ready,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Health => "/health",
            Commands::Healthz => "/healthz",
            Commands::Ready => "/ready",
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(cli.timeout))
        .build()?;

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = match client.get(&url).send().await {
        Ok(res) => res,
        Err(e) => {
            eprintln!("Error: could not reach {}: {}", url, e);
            return Ok(ExitCode::from(2));
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => {
            eprintln!("Error: probe returned status {}", status);
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
            return Ok(ExitCode::from(2));
        }
    }

    if status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Unhealthy: probe returned status {}", status);
        Ok(ExitCode::FAILURE)
    }
}
