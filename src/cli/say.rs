//! Non-interactive "say" command

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::core::engine::{ChatEngine, TurnOutcome};

pub async fn run_say(
    mut engine: ChatEngine,
    prompt: &[String],
    images: &[PathBuf],
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() && images.is_empty() {
        return Err("Usage: askliam say <prompt> [--image <path>]...".into());
    }

    for path in images {
        engine.attachments_mut().enqueue_from_file(path.clone());
    }
    engine.attachments_mut().settle().await;
    let ready = engine.attachments_mut().len();
    if ready < images.len() {
        eprintln!("⚠️  {} attachment(s) could not be read", images.len() - ready);
    }

    let (stream_service, mut rx) = ChatStreamService::new();
    let mut stdout = io::stdout();
    let outcome = engine
        .run_turn(&prompt, &stream_service, &mut rx, |event| {
            if let StreamMessage::Chunk(content) = event {
                let _ = write!(stdout, "{content}");
                let _ = stdout.flush();
            }
        })
        .await;

    match outcome {
        TurnOutcome::Completed(_) => {
            println!();
            Ok(())
        }
        TurnOutcome::Failed(error) => {
            println!();
            Err(error.into())
        }
        TurnOutcome::Empty => Err("Nothing to send".into()),
        TurnOutcome::Busy => Err("A message is already being sent".into()),
    }
}
