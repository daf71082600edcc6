use std::process::ExitCode;

fn main() -> ExitCode {
    dealcast_cli::run()
}
