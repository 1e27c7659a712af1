use std::process::ExitCode;

use lifeboard::error::StoreError;

fn main() -> ExitCode {
    match lifeboard::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if !lifeboard::cli::already_reported(&err) {
                eprintln!("error: {err:#}");
            }
            if matches!(err.downcast_ref::<StoreError>(), Some(StoreError::AuthRequired)) {
                eprintln!("hint: run `lifeboard auth login <email>` first");
            }
            ExitCode::FAILURE
        }
    }
}
