use std::process::ExitCode;

fn main() -> ExitCode {
    pricewise_cli::run()
}
