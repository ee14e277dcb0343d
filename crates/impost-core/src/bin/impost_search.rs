//! Search a mail-index database from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use impost_core::{Database, DatabaseMode};

/// Search a mail-index database.
#[derive(Parser)]
#[command(name = "impost-search", version)]
struct Args {
    /// Database directory
    #[arg(long)]
    dir: PathBuf,

    /// Query string (empty matches every message)
    #[arg(long, default_value = "")]
    query: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("impost-search: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> impost_core::Result<()> {
    let db = Database::open(&args.dir, DatabaseMode::ReadOnly)?;
    let query = db.create_query(args.query.as_str());
    for message in query.search_messages()? {
        println!(
            "id:{} subject:{:?} from:{}",
            message.id(),
            message.subject()?,
            message.from_address()?
        );
    }
    Ok(())
}
