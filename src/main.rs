//! Aider MCP Client - fetch library documentation from MCP servers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aider_mcp_client::config::{ConfigLoader, ServerConfig, DEFAULT_SERVER};
use aider_mcp_client::display;
use aider_mcp_client::tools::{DocsClient, MIN_TOKENS};

#[derive(Parser)]
#[command(
    name = "aider-mcp-client",
    about = "Aider MCP client for fetching library documentation, defaulting to Context7",
    disable_version_flag = true
)]
struct Cli {
    /// Show version information
    #[arg(short = 'v', long)]
    version: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress informational output
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default search locations
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// MCP server to use, by name from the config file
    #[arg(long, global = true, default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch JSON documentation for a library.
    Fetch {
        /// Library ID or name (e.g., vercel/nextjs or just nextjs).
        library_id: String,
        /// Topic to filter documentation.
        #[arg(long, default_value = "")]
        topic: String,
        /// Maximum tokens (raised to the server minimum if lower).
        #[arg(long, default_value_t = MIN_TOKENS, value_parser = clap::value_parser!(u32).range(1..))]
        tokens: u32,
        /// Timeout in seconds (overrides config).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
    /// Resolve a library name to a Context7-compatible ID.
    Resolve {
        /// Library name to resolve (e.g., nextjs).
        library_name: String,
        /// Timeout in seconds (overrides config).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
    /// List supported libraries.
    List,
}

fn init_tracing(debug: bool, quiet: bool) {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_server(config_path: Option<PathBuf>, name: &str) -> ServerConfig {
    let loader = config_path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    tracing::debug!(paths = ?loader.search_paths(), "Config search paths");
    let server = loader.load().server(name);
    if !server.enabled {
        tracing::warn!(server = %name, "Server is disabled in config, using it anyway");
    }
    server
}

async fn run_fetch(
    server: &ServerConfig,
    library_id: &str,
    topic: &str,
    tokens: u32,
    timeout: Option<u64>,
) -> ExitCode {
    let client = DocsClient::from_config(server, timeout);
    tracing::info!("Using timeout of {} seconds", client.timeout().as_secs());

    match client.fetch_docs(library_id, topic, tokens).await {
        Ok(Some(bundle)) => match display::print_bundle(&bundle) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                display::print_error(&format!("Failed to write documentation: {e}"));
                ExitCode::FAILURE
            }
        },
        Ok(None) => {
            display::print_error("No valid response received from the server");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Error fetching documentation");
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run_resolve(server: &ServerConfig, library_name: &str, timeout: Option<u64>) -> ExitCode {
    let client = DocsClient::from_config(server, timeout);

    match client.resolve_name(library_name).await {
        Ok(Some(id)) => {
            display::print_resolved(library_name, &id);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            display::print_unresolved(library_name);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Error resolving library ID");
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.quiet);
    tracing::debug!("Debug logging enabled");

    if cli.version {
        display::print_banner();
        return ExitCode::SUCCESS;
    }

    let Some(command) = cli.command else {
        display::print_banner();
        return ExitCode::SUCCESS;
    };

    match command {
        Commands::Fetch {
            library_id,
            topic,
            tokens,
            timeout,
        } => {
            let server = load_server(cli.config, &cli.server);
            run_fetch(&server, &library_id, &topic, tokens, timeout).await
        }
        Commands::Resolve {
            library_name,
            timeout,
        } => {
            let server = load_server(cli.config, &cli.server);
            run_resolve(&server, &library_name, timeout).await
        }
        Commands::List => {
            display::print_library_list_unavailable();
            ExitCode::SUCCESS
        }
    }
}
