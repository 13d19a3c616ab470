use std::io::BufRead;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use rustyline::config::Builder;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Editor};
use tokio::time::Instant;

use repdb::txn::TransactionManager;

use crate::ast::parser;
use crate::config::{ConfigLoad, DEFAULT_PROMPT};
use crate::report::StdoutReporter;
use crate::rusty::CliHelper;

/// An interactive or piped simulator session. Every input line is one
/// logical tick, whether it came from the REPL or a script.
pub struct Session {
    settings: ConfigLoad,
    tm: TransactionManager<StdoutReporter>,
    keywords: Arc<Vec<String>>,
}

impl Session {
    pub async fn try_new(settings: ConfigLoad, is_repl: bool) -> Result<Self> {
        if is_repl && !settings.is_quiet() {
            println!("Welcome to repdb.");
            println!();
        }

        Ok(Self {
            settings,
            tm: TransactionManager::new(StdoutReporter),
            keywords: Arc::new(parser::all_keywords()),
        })
    }

    async fn prompt(&self) -> String {
        match self.settings.prompt.as_ref() {
            Some(prompt) => format!("{} > ", prompt.trim_end()),
            None => format!("{} > ", DEFAULT_PROMPT),
        }
    }

    pub async fn handle_repl(&mut self) -> Result<()> {
        let config = Builder::new()
            .completion_prompt_limit(5)
            .completion_type(CompletionType::Circular)
            .build();
        let mut rl = Editor::<CliHelper, DefaultHistory>::with_config(config)?;

        rl.set_helper(Some(CliHelper::with_keywords(self.keywords.clone())));
        rl.load_history(&get_history_path()).ok();

        loop {
            match rl.readline(&self.prompt().await) {
                Ok(line) => {
                    let line = line.trim().to_owned();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        break;
                    }
                    let _ = rl.add_history_entry(&line);

                    // a bad line should not kill an interactive session
                    if let Err(e) = self.step(&line) {
                        eprintln!("error: {}", e);
                    }
                }
                Err(e) => match e {
                    ReadlineError::Io(err) => {
                        eprintln!("io err: {err}");
                    }
                    ReadlineError::Interrupted => {
                        println!("^C");
                    }
                    ReadlineError::Eof => {
                        break;
                    }
                    _ => {}
                },
            }
        }

        self.tm.finalize()?;
        if !self.settings.is_quiet() {
            println!("Bye~");
        }
        let _ = rl.save_history(&get_history_path());
        Ok(())
    }

    pub async fn handle_reader<R: BufRead>(&mut self, r: R) -> Result<()> {
        let start = Instant::now();

        for line in r.lines() {
            match line {
                Ok(line) => self.step(&line)?,
                Err(e) => return Err(anyhow!("read lines err: {}", e)),
            }
        }
        self.tm.finalize()?;

        // local time
        if self.settings.is_show_stats() {
            println!("{:.3}", start.elapsed().as_secs_f64());
        }

        Ok(())
    }

    /// Runs one input line as one logical tick.
    fn step(&mut self, line: &str) -> Result<()> {
        let commands = parser::parse_line(line)?;
        info!("tick input: {:?}", commands);
        self.tm.tick(&commands)?;
        Ok(())
    }
}

fn get_history_path() -> String {
    format!(
        "{}/.repdbcli_history",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    )
}
