use std::process::ExitCode;

fn main() -> ExitCode {
    match labwise::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("labwise: {e}");
            ExitCode::FAILURE
        }
    }
}
