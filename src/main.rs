use anyhow::Result;
use clap::{Parser, Subcommand};
use fetch_mux::{BackendKind, FetchConfig, Orchestrator};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fetch-mux")]
#[command(about = "Multiplexer for download tools - fetch URLs with automatic fallback")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory for config lookup (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to a file; without a value, a timestamped path
    /// under the config directory is used
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL
    Get {
        /// URL to fetch
        url: String,

        /// Write the payload to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Method to use: auto, curl, wget, or powershell
        #[arg(short, long)]
        method: Option<BackendKind>,

        /// Do not fall back to other tools when the chosen one fails
        #[arg(long)]
        no_fallback: bool,

        /// Extra header, as "Name: Value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Basic-auth username (requires --password)
        #[arg(long)]
        user: Option<String>,

        /// Basic-auth password (requires --user)
        #[arg(long)]
        password: Option<String>,

        /// Proxy URL
        #[arg(long)]
        proxy: Option<String>,

        /// Per-attempt timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Skip TLS certificate verification
        #[arg(short = 'k', long)]
        insecure: bool,

        /// User-Agent header value
        #[arg(short = 'A', long)]
        user_agent: Option<String>,

        /// Print the full result as JSON instead of the payload
        #[arg(long)]
        json: bool,
    },

    /// Probe each download tool and report availability
    Doctor,

    /// List the backend chain in preference order
    Backends,
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid header '{}', expected 'Name: Value'", raw))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

/// Basic auth requires both halves; half a pair is a caller mistake, not
/// something to silently send unauthenticated.
fn auth_pair(
    user: Option<String>,
    password: Option<String>,
) -> Result<Option<(String, String)>> {
    match (user, password) {
        (Some(user), Some(password)) => Ok(Some((user, password))),
        (None, None) => Ok(None),
        (Some(_), None) => anyhow::bail!("--user requires --password"),
        (None, Some(_)) => anyhow::bail!("--password requires --user"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = match cli.log_file.clone() {
        Some(Some(path)) => Some(path),
        Some(None) => Some(fetch_mux::logging::default_log_path()?),
        None => None,
    };
    fetch_mux::logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let config = FetchConfig::load(cli.dir.as_deref())?;
    let orchestrator = Orchestrator::new();

    match cli.command {
        Commands::Get {
            url,
            output,
            method,
            no_fallback,
            headers,
            user,
            password,
            proxy,
            timeout,
            insecure,
            user_agent,
            json,
        } => {
            let mut spec = config.request(&url);
            if let Some(method) = method {
                spec = spec.with_method(method);
            }
            if no_fallback {
                spec = spec.with_fallback(false);
            }
            for raw in &headers {
                let (name, value) = parse_header(raw)?;
                spec = spec.with_header(name, value);
            }
            if let Some((user, password)) = auth_pair(user, password)? {
                spec = spec.with_basic_auth(user, password);
            }
            if let Some(proxy) = proxy {
                spec = spec.with_proxy(proxy);
            }
            if let Some(timeout) = timeout {
                spec = spec.with_timeout(Duration::from_secs(timeout));
            }
            if insecure {
                spec = spec.with_insecure(true);
            }
            if let Some(agent) = user_agent {
                spec = spec.with_user_agent(agent);
            }
            if let Some(output) = output {
                let expanded = shellexpand::tilde(&output);
                spec = spec.with_output_file(PathBuf::from(expanded.as_ref()));
            }

            let result = orchestrator.download(&spec).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.success {
                if let Some(content) = &result.content {
                    print!("{}", content);
                } else if let Some(path) = &result.file_path {
                    if !cli.quiet {
                        eprintln!("saved to {} ({})", path.display(), result.used_method);
                    }
                }
            } else {
                eprintln!("{}", result.error_message);
            }

            if !result.success {
                std::process::exit(1);
            }
        }

        Commands::Doctor => {
            println!("Checking download tools...\n");
            for (kind, available) in orchestrator.availability().await {
                let status = if available { "ok" } else { "not found" };
                println!("  {} - {}", kind, status);
            }
            match orchestrator.best_available().await {
                Some(best) => println!("\nbest available: {}", best),
                None => println!("\nno download tool available"),
            }
        }

        Commands::Backends => {
            for kind in BackendKind::FALLBACK_ORDER {
                println!("{}", kind);
            }
        }
    }

    Ok(())
}
