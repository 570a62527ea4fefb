//! Stdio transport: spawn an MCP server, send one request, read one response.

mod bridge;
mod process;
mod reader;
mod request;
mod state;

pub use bridge::*;
pub use process::*;
pub use reader::*;
pub use request::*;
pub use state::*;
