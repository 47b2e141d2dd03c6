//! CLI command handlers.

mod chaos;
mod wrap;

pub use chaos::run_chaos;
pub use wrap::run_wrapped;
