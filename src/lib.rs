//! Aider MCP Client - library documentation from MCP servers over stdio.

pub mod config;
pub mod display;
pub mod tools;
pub mod transport;
