use std::process::ExitCode;

use emu_migrate::MigrateError;
use emu_migrate::output as out;

mod app;
mod logging;

fn main() -> ExitCode {
    let args = emu_migrate::cli::parse();
    match app::run(args) {
        Ok(code) => code,
        Err(e) => {
            out::print_error(&format!("{e:#}"));
            let code = e.downcast_ref::<MigrateError>().map_or(1, MigrateError::code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
