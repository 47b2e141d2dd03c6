mod cli;

use crate::cli::Cli;

fn main() {
    // Parse CLI, set up logging and dispatch.
    let code = match Cli::run_from_args() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("eb error: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}
