//! Console output for the CLI.
//!
//! The documentation envelope goes to stdout as plain JSON so Aider can
//! consume it directly; everything else is decorated for humans.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::tools::NormalizedDocBundle;

/// Where to point users for the list of supported libraries.
pub const CONTEXT7_URL: &str = "https://context7.com";

/// Render the documentation envelope as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn format_bundle(bundle: &NormalizedDocBundle) -> serde_json::Result<String> {
    serde_json::to_string_pretty(bundle)
}

/// Print the documentation envelope to stdout.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn print_bundle(bundle: &NormalizedDocBundle) -> io::Result<()> {
    let json = format_bundle(bundle).map_err(io::Error::other)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    stdout.flush()
}

/// Print a successful name resolution.
pub fn print_resolved(name: &str, id: &str) {
    println!("Resolved '{}' to: {}", name, id.green().bold());
    let _ = io::stdout().flush();
}

/// Print a failed name resolution.
pub fn print_unresolved(name: &str) {
    println!("{} {}", "Could not resolve library name:".yellow(), name);
    let _ = io::stdout().flush();
}

/// Print the placeholder for the `list` command.
pub fn print_library_list_unavailable() {
    println!("Fetching list of supported libraries from Context7...");
    println!(
        "This feature is not yet implemented. Please check {} for supported libraries.",
        CONTEXT7_URL.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print version and usage information.
pub fn print_banner() {
    println!(
        "{} v{}",
        "Aider MCP Client".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("A client for fetching library documentation from MCP servers over stdio");
    println!("Default server: {}", "Context7 MCP".cyan());
    println!();
    println!("Usage: aider-mcp-client <command> [args...]");
    println!("For help: aider-mcp-client --help");
    let _ = io::stdout().flush();
}

/// Print an error message to stderr.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
