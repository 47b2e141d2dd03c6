//! Chaos mode: pretend to be an unreliable tool.
//!
//! Prints one of a fixed set of messages and exits with the matching code,
//! so retry rules can be tried out without a real flaky service.

use rand::Rng;

/// A canned result: message for stdout and process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleResult {
    pub message: &'static str,
    pub exit_code: i32,
}

/// Cumulative thresholds over a uniform draw in [0, 1). Checked top-down.
const SAMPLES: [(f64, SampleResult); 6] = [
    (0.875, SampleResult { message: "Sample Error: TLS Timeout", exit_code: 3 }),
    (0.75, SampleResult { message: "Sample Error: Request Timed Out", exit_code: 3 }),
    // Real services do report failure with a success status.
    (0.675, SampleResult { message: "Sample Error: 200 OK: The web request failed", exit_code: 0 }),
    (0.5, SampleResult { message: "Sample Error: Rate Limit Exceeded", exit_code: 2 }),
    (0.375, SampleResult { message: "Sample Error: Already Exists", exit_code: 1 }),
    (0.25, SampleResult { message: "Sample Error: Concurrent Modification", exit_code: 1 }),
];

const SUCCESS: SampleResult = SampleResult {
    message: "Sample Success: 200 OK: Your request succeeded",
    exit_code: 0,
};

/// Pick the sample for a draw in [0, 1).
pub fn sample_for(draw: f64) -> SampleResult {
    SAMPLES
        .iter()
        .find(|(threshold, _)| draw > *threshold)
        .map(|(_, sample)| *sample)
        .unwrap_or(SUCCESS)
}

pub fn sample<R: Rng>(rng: &mut R) -> SampleResult {
    sample_for(rng.random::<f64>())
}

/// Draw a sample from the thread-local generator.
pub fn random_sample() -> SampleResult {
    sample(&mut rand::rng())
}
