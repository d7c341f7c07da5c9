use std::process::ExitCode;

fn main() -> ExitCode {
    plantdesk_cli::run()
}
