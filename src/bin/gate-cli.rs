use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Operator CLI for the admin gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "ADMIN_GATE_URL")]
    url: String,

    /// Bearer token.
    #[arg(short, long, env = "ADMIN_GATE_TOKEN")]
    token: Option<String>,

    /// Identity claim sent as X-Subject-Id.
    #[arg(short, long)]
    subject: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a protected operation with a JSON payload
    Invoke {
        operation: String,
        /// JSON object, e.g. '{"topic": "Q3 launch"}'
        #[arg(default_value = "{}")]
        payload: String,
    },
    /// Query the audit log
    Audit {
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        target_type: Option<String>,
        #[arg(long)]
        target_id: Option<String>,
        #[arg(long)]
        outcome: Option<String>,
        /// RFC 3339, inclusive
        #[arg(long)]
        from: Option<String>,
        /// RFC 3339, exclusive
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Check gate status
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }
    if let Some(subject) = &cli.subject {
        headers.insert("x-subject-id", HeaderValue::from_str(subject)?);
    }

    match cli.command {
        Commands::Invoke { operation, payload } => {
            let body: Value = serde_json::from_str(&payload)?;
            let res = client
                .post(format!("{}/ops/{}", cli.url, operation))
                .headers(headers)
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Audit {
            actor,
            action,
            target_type,
            target_id,
            outcome,
            from,
            to,
            limit,
        } => {
            let params: Vec<(&str, String)> = [
                ("actor", actor),
                ("action", action),
                ("target_type", target_type),
                ("target_id", target_id),
                ("outcome", outcome),
                ("from", from),
                ("to", to),
                ("limit", limit.map(|l| l.to_string())),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();

            let res = client
                .get(format!("{}/audit", cli.url))
                .headers(headers)
                .query(&params)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(retry) = res.headers().get("retry-after") {
        eprintln!("Retry after: {}s", retry.to_str().unwrap_or("?"));
    }

    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
    } else {
        eprintln!("Error: gate returned status {}", status);
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
    Ok(())
}
