use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "editable-config-cli")]
#[command(about = "Admin CLI for runtime configuration overrides", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "EDITABLE_CONFIG_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List editable options with their live values and overrides
    List {
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Override options, given as KEY=VALUE (VALUE may be JSON)
    Change {
        #[arg(required = true, value_parser = parse_assignment)]
        options: Vec<(String, Value)>,
        /// Store only, reconcile later
        #[arg(long)]
        no_apply: bool,
    },
    /// Swap overrides back to their previous values
    Revert {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        no_apply: bool,
    },
    /// Delete overrides
    Reset {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        no_apply: bool,
    },
    /// Force a reconciliation pass
    Apply {
        /// Keys whose overrides were removed elsewhere
        removed_keys: Vec<String>,
    },
    /// Show when overrides were last reconciled
    LastCheck,
    /// Show reconciler status
    Status,
}

/// `site.title=My Portal` → ("site.title", "My Portal"); JSON values are kept typed.
fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/api/editable-config", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::List { pattern } => client
            .get(format!("{}/list", base))
            .query(&[("pattern", pattern)]),
        Commands::Change { options, no_apply } => {
            let options: Map<String, Value> = options.into_iter().collect();
            client
                .post(format!("{}/change", base))
                .json(&json!({ "options": options, "apply": !no_apply }))
        }
        Commands::Revert { keys, no_apply } => client
            .post(format!("{}/revert", base))
            .json(&json!({ "keys": keys, "apply": !no_apply })),
        Commands::Reset { keys, no_apply } => client
            .post(format!("{}/reset", base))
            .json(&json!({ "keys": keys, "apply": !no_apply })),
        Commands::Apply { removed_keys } => client
            .post(format!("{}/apply", base))
            .json(&json!({ "removed_keys": removed_keys })),
        Commands::LastCheck => client.get(format!("{}/last-check", base)),
        Commands::Status => client.get(format!("{}/status", base)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("site.title=My Portal").unwrap(),
            ("site.title".to_string(), json!("My Portal"))
        );
        assert_eq!(
            parse_assignment("search.rows=20").unwrap(),
            ("search.rows".to_string(), json!(20))
        );
        assert_eq!(
            parse_assignment("app.plugins=[\"a\",\"b\"]").unwrap(),
            ("app.plugins".to_string(), json!(["a", "b"]))
        );
        assert_eq!(
            parse_assignment("a=b=c").unwrap(),
            ("a".to_string(), json!("b=c"))
        );
        assert!(parse_assignment("site.title").is_err());
    }
}
