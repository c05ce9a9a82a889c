use std::process::ExitCode;

fn main() -> ExitCode {
    ledgerbot_cli::run()
}
