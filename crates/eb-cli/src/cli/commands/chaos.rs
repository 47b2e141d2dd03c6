//! `eb --kill` – behave like a flaky tool.

use eb_core::chaos;

/// Print a random sample message and return its exit code.
pub fn run_chaos() -> i32 {
    let sample = chaos::random_sample();
    tracing::debug!(exit_code = sample.exit_code, "chaos sample");
    println!("{}", sample.message);
    sample.exit_code
}
