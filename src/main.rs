mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;
mod organizer;

use crate::error::OrganizerErrorCode;

fn main() {
    let dotenv = env_loader::load_dotenv();

    if let Err(err) = cli::run(dotenv.as_deref()) {
        match OrganizerErrorCode::from_error(&err) {
            Some(code) => eprintln!("error[{}]: {err:#}", code.as_str()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}
