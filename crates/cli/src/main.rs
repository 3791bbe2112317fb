use std::process::ExitCode;

fn main() -> ExitCode {
    showings_cli::run()
}
