use std::process::ExitCode;

fn main() -> ExitCode {
    pollbot_cli::run()
}
