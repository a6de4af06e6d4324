//! CLI domain: parse, route, and output only.
//! Commands delegate to the marshaler and config loader.

mod output;
mod parse;
mod route;

pub use output::{format_items, map_error, OutputFormat};
pub use parse::{Cli, Commands};
pub use route::RunContext;
