//! Tool-level operations built on the stdio transport.

mod client;
mod normalize;

pub use client::*;
pub use normalize::*;
