use std::process::ExitCode;

fn main() -> ExitCode {
    atelier_cli::init_logging();
    atelier_cli::run()
}
