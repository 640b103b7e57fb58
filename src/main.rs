use clap::Parser;
use cobble::cli::{run, Cli};
use cobble::log_at;
use cobble::logging::{init_logging, log_error_chain, LogConfig, Severity};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = match init_logging(&LogConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    log_at!(
        Severity::Notice,
        config = %cli.config.display(),
        "Cobble v{}",
        env!("CARGO_PKG_VERSION")
    );
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_error_chain(Severity::Emergency, "Cobble stopped", &*err);
            ExitCode::FAILURE
        }
    }
}
