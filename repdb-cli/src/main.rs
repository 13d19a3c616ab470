use std::io::{stdin, IsTerminal};

use anyhow::Result;
use clap::Parser;
use log::info;

use repdbcli::config::ConfigLoad;
use repdbcli::{session, trace};

#[derive(Debug, Parser, PartialEq)]
#[command(version, author, about)]
pub struct Args {
    #[clap(short, long, help = "debug mode")]
    debug: bool,

    /// Configuration file path, default 'config/repdb.yaml'
    #[clap(
        short = 'c',
        long = "config",
        help = "Configuration file path",
        default_value = "config/repdb.yaml"
    )]
    config: String,

    /// quiet mode, nothing but simulator output printed to stdout
    #[clap(long = "quiet", short = 'q', default_value = "false")]
    quiet: bool,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,

    #[clap(short = 'n', long, help = "Force non-interactive mode", default_value = "false")]
    non_interactive: bool,

    #[clap(long, require_equals = true, help = "Script to execute")]
    query: Option<String>,
}

/// CMD like:
///     repdbcli                     ==> an interactive REPL
///     cat in.txt | repdbcli        ==> runs the script from stdin
///     repdbcli --query='dump()'    ==> runs the given script
#[tokio::main]
pub async fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        println!("{:?}", args);
    }

    let log_dir = format!(
        "{}/.repdbcli",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    );
    let _guards = trace::init_logging(&log_dir, &args.log_level).await?;
    info!("repdbcli start args: {:?}", &args);

    let mut cfg = match ConfigLoad::new(args.config.as_ref()) {
        Ok(c) => c,
        Err(_) => ConfigLoad::default(),
    };
    if args.debug {
        println!("{:?}", &cfg);
        eprintln!();
    }
    info!("repdbcli start config: {:?}", &cfg);

    let is_terminal = stdin().is_terminal();
    let is_repl = is_terminal && !args.non_interactive && args.query.is_none();
    if is_repl {
        cfg.terminal_update();
    }
    if args.quiet {
        cfg.quiet = Some(true);
        cfg.show_stats = Some(false);
    }

    let mut session = session::Session::try_new(cfg, is_repl).await?;

    if is_repl {
        session.handle_repl().await?;
        return Ok(());
    }

    match args.query {
        None => {
            session.handle_reader(stdin().lock()).await?;
        }
        Some(query) => {
            session.handle_reader(std::io::Cursor::new(query)).await?;
        }
    }

    Ok(())
}
