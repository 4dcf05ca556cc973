//! `groundchat chat`: terminal chat loop.
//!
//! One process, one session. Answers are printed progressively as the
//! completion streams in.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use groundchat_core::orchestrator::{ChatOrchestrator, TurnOutcome};
use groundchat_core::session::Session;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Prints only the not-yet-printed suffix of an accumulating buffer.
pub struct DeltaPrinter<W: Write> {
    out: W,
    printed: usize,
}

impl<W: Write> DeltaPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    /// Render the full buffer so far. Buffers only ever grow during a turn.
    pub fn render(&mut self, buffer: &str) {
        if let Some(delta) = buffer.get(self.printed..) {
            let _ = self.out.write_all(delta.as_bytes());
            let _ = self.out.flush();
        }
        self.printed = buffer.len();
    }

    /// Whether anything was streamed.
    pub fn streamed(&self) -> bool {
        self.printed > 0
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Interactive chat loop over one session.
pub struct ChatRepl {
    orchestrator: Arc<ChatOrchestrator>,
    session: Session,
}

impl ChatRepl {
    pub fn new(orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self {
            orchestrator,
            session: Session::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        print_welcome();

        loop {
            match rl.readline("you> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('/') {
                        if self.handle_command(trimmed) {
                            break;
                        }
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);
                    self.process(&line).await;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Bye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle slash commands. Returns true if should exit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            "/quit" | "/exit" | "/q" => {
                println!("Bye!");
                true
            }
            "/help" | "/h" | "/?" => {
                print_help();
                false
            }
            "/history" => {
                println!();
                for message in self.session.messages() {
                    println!("[{}] {}", message.role.as_str(), message.content);
                }
                println!();
                false
            }
            "/new" => {
                self.session = Session::new();
                println!("Started a new conversation.");
                false
            }
            _ => {
                println!("Unknown command: {}", cmd);
                println!("Type /help for available commands");
                false
            }
        }
    }

    async fn process(&mut self, input: &str) {
        print!("assistant> ");
        let _ = io::stdout().flush();

        let mut printer = DeltaPrinter::new(io::stdout());
        let outcome = self
            .orchestrator
            .process_turn(&mut self.session, input, |buffer| printer.render(buffer))
            .await;

        match &outcome {
            TurnOutcome::Answered { .. } if printer.streamed() => println!(),
            TurnOutcome::Ignored => println!(),
            other => {
                // Fixed replies replace whatever partial text was streamed.
                if printer.streamed() {
                    println!();
                }
                println!("{}", other.reply().unwrap_or_default());
            }
        }
        println!();
    }
}

fn print_welcome() {
    println!();
    println!("groundchat: ask questions about the help guide.");
    println!();
    print_help();
}

fn print_help() {
    println!("Commands:");
    println!("  /help, /h, /?    - Show this help");
    println!("  /history         - Show the conversation so far");
    println!("  /new             - Start a new conversation");
    println!("  /quit, /exit, /q - Exit chat");
    println!();
}
