use std::process::ExitCode;

fn main() -> ExitCode {
    match clipkeepd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("clipkeepd: {error}");
            ExitCode::from(error.exit_status())
        }
    }
}
