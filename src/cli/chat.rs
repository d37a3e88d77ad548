//! Line-based interactive chat.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::api::metrics::{format_metrics, HttpMetricsSource, MetricsSource};
use crate::cli::http_client;
use crate::cli::repl_command::{parse_command, ReplCommand, HELP};
use crate::cli::settings::parse_setting;
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::core::config::printing::settings_table;
use crate::core::config::Config;
use crate::core::engine::{ChatEngine, TurnOutcome};
use crate::core::settings::InferenceSettings;
use crate::utils::clipboard::read_clipboard_images;
use crate::utils::logging::TranscriptLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ChatSession<W: Write> {
    engine: ChatEngine,
    service: ChatStreamService,
    rx: mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    transcript: TranscriptLog,
    metrics: HttpMetricsSource,
    defaults: InferenceSettings,
    out: W,
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path,
    }
}

/// Decoded size of a padded base64 payload.
fn encoded_len(data: &str) -> usize {
    let padding = data.bytes().rev().take_while(|b| *b == b'=').count();
    (data.len() / 4 * 3).saturating_sub(padding)
}

fn human_size(bytes: usize) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0)),
        b if b >= 1024 => format!("{:.1} KiB", b as f64 / 1024.0),
        b => format!("{b} B"),
    }
}

impl<W: Write> ChatSession<W> {
    pub fn new(
        engine: ChatEngine,
        defaults: InferenceSettings,
        transcript: TranscriptLog,
        out: W,
    ) -> Result<Self, Box<dyn Error>> {
        let metrics = HttpMetricsSource::new(http_client()?, engine.base_url());
        let (service, rx) = ChatStreamService::new();
        Ok(Self {
            engine,
            service,
            rx,
            transcript,
            metrics,
            defaults,
            out,
        })
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub async fn handle_line(&mut self, line: &str) -> Result<Flow, Box<dyn Error>> {
        match parse_command(line) {
            ReplCommand::Message(text) => self.send(&text).await?,
            ReplCommand::Attach(path) => self.attach(expand_home(path)).await?,
            ReplCommand::Paste => self.paste().await?,
            ReplCommand::Files => self.list_files()?,
            ReplCommand::Remove(position) => {
                match self.engine.attachments_mut().remove(position - 1) {
                    Some(removed) => writeln!(self.out, "Removed {}", removed.name)?,
                    None => writeln!(self.out, "No attachment #{position}")?,
                }
            }
            ReplCommand::System(None) => {
                let prompt = self.engine.system_prompt();
                if prompt.is_empty() {
                    writeln!(self.out, "No system prompt set")?;
                } else {
                    writeln!(self.out, "System prompt: {prompt}")?;
                }
            }
            ReplCommand::System(Some(prompt)) => {
                self.engine.set_system_prompt(prompt);
                writeln!(self.out, "✅ System prompt updated")?;
            }
            ReplCommand::Set { field, value } => {
                let result = parse_setting(&field, &value)
                    .and_then(|(field, value)| self.engine.validate_and_set(field, value).map(|s| (field, s)));
                match result {
                    Ok((field, settings)) => {
                        writeln!(self.out, "✅ {field} = {}", settings.get(field))?
                    }
                    Err(err) => writeln!(self.out, "❌ {err}")?,
                }
            }
            ReplCommand::Settings => {
                write!(self.out, "{}", settings_table(self.engine.settings(), &self.defaults))?;
            }
            ReplCommand::Metrics => {
                let metrics = self.metrics.fetch_or_default().await;
                writeln!(self.out, "{}", format_metrics(&metrics))?;
            }
            ReplCommand::Log(Some(path)) => match self.transcript.set_log_file(path) {
                Ok(message) => writeln!(self.out, "{message}")?,
                Err(err) => writeln!(self.out, "❌ Could not open log file: {err}")?,
            },
            ReplCommand::Log(None) => match self.transcript.toggle_logging() {
                Ok(message) => writeln!(self.out, "{message}")?,
                Err(err) => writeln!(self.out, "❌ {err}")?,
            },
            ReplCommand::Session => writeln!(self.out, "Session: {}", self.engine.session_id())?,
            ReplCommand::Help => writeln!(self.out, "{HELP}")?,
            ReplCommand::Quit => return Ok(Flow::Quit),
            ReplCommand::Usage(usage) => writeln!(self.out, "Usage: {usage}")?,
            ReplCommand::Unknown(name) => {
                writeln!(self.out, "❌ Unknown command: /{name} (try /help)")?
            }
        }
        self.out.flush()?;
        Ok(Flow::Continue)
    }

    async fn send(&mut self, text: &str) -> Result<(), Box<dyn Error>> {
        self.engine.attachments_mut().settle().await;
        let first_new = self.engine.messages().len();

        let out = &mut self.out;
        let outcome = self
            .engine
            .run_turn(text, &self.service, &mut self.rx, |event| {
                if let StreamMessage::Chunk(content) = event {
                    let _ = write!(out, "{content}");
                    let _ = out.flush();
                }
            })
            .await;

        match outcome {
            TurnOutcome::Completed(_) => writeln!(self.out)?,
            TurnOutcome::Failed(error) => {
                if !self.engine.accumulated_text().is_empty() {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "❌ Error: {error}")?;
            }
            TurnOutcome::Busy => writeln!(self.out, "⏳ Still answering the previous message")?,
            TurnOutcome::Empty => return Ok(()),
        }

        for message in &self.engine.messages()[first_new..] {
            if let Err(err) = self.transcript.log_message(message) {
                warn!(error = %err, "failed to write transcript");
            }
        }
        Ok(())
    }

    async fn attach(&mut self, path: PathBuf) -> Result<(), Box<dyn Error>> {
        let attachments = self.engine.attachments_mut();
        let before = attachments.len();
        attachments.enqueue_from_file(path.clone());
        attachments.settle().await;

        if attachments.len() > before {
            let name = attachments.items().last().map(|a| a.name.clone()).unwrap_or_default();
            let pending = attachments.len();
            writeln!(self.out, "📎 Attached {name} ({pending} pending)")?;
        } else {
            writeln!(self.out, "❌ Could not attach {}", path.display())?;
        }
        Ok(())
    }

    async fn paste(&mut self) -> Result<(), Box<dyn Error>> {
        let items = match tokio::task::spawn_blocking(read_clipboard_images).await? {
            Ok(items) => items,
            Err(err) => {
                writeln!(self.out, "❌ {err}")?;
                return Ok(());
            }
        };

        let attachments = self.engine.attachments_mut();
        let taken = attachments.enqueue_from_clipboard(items);
        attachments.settle().await;
        if taken == 0 {
            writeln!(self.out, "No image on the clipboard")?;
        } else {
            writeln!(self.out, "📎 Attached {taken} image(s) from the clipboard")?;
        }
        Ok(())
    }

    fn list_files(&mut self) -> Result<(), Box<dyn Error>> {
        let items = self.engine.attachments_mut().items().to_vec();
        if items.is_empty() {
            writeln!(self.out, "No pending attachments")?;
        }
        for (index, item) in items.iter().enumerate() {
            writeln!(
                self.out,
                "  {}. {} ({}, {})",
                index + 1,
                item.name,
                item.mime,
                human_size(encoded_len(&item.data))
            )?;
        }
        Ok(())
    }
}

pub async fn run_chat(
    engine: ChatEngine,
    config: &Config,
    transcript: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let defaults = InferenceSettings::for_profile(config.profile.unwrap_or_default());
    let mut session = ChatSession::new(engine, defaults, TranscriptLog::new(transcript)?, io::stdout())?;

    eprintln!(
        "askliam {} | {} | session {}",
        env!("CARGO_PKG_VERSION"),
        session.engine().base_url(),
        session.engine().session_id()
    );
    eprintln!("Type a message and press Enter. /help lists commands, /quit leaves.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        if session.handle_line(&line).await? == Flow::Quit {
            break;
        }
    }
    Ok(())
}
