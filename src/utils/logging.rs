use crate::core::message::{ChatMessage, MessageContent};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Plain-text transcript of the conversation, appended one message at a time.
pub struct TranscriptLog {
    file_path: Option<String>,
    is_active: bool,
}

impl TranscriptLog {
    /// A log that starts writing immediately when `log_file` is given.
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut log = TranscriptLog {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            log.set_log_file(path)?;
        }
        Ok(log)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn std::error::Error>> {
        // Fail now rather than on the first message.
        OpenOptions::new().create(true).append(true).open(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                if self.is_active {
                    self.write_to_log("## Logging paused")?;
                    self.is_active = false;
                    Ok(format!("Logging paused (file: {path})"))
                } else {
                    self.is_active = true;
                    Ok(format!("Logging resumed to: {path}"))
                }
            }
            None => {
                Err("No log file specified. Use /log <filename> to enable logging first.".into())
            }
        }
    }

    pub fn log_message(&self, message: &ChatMessage) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_active {
            return Ok(());
        }
        self.write_to_log(&render_message(message))
    }

    fn write_to_log(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        // Blank line between messages.
        writeln!(writer)?;

        writer.flush()?;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn get_status_string(&self) -> String {
        let file_name = |path: &str| {
            Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path)),
            (Some(path), false) => format!("paused ({})", file_name(path)),
        }
    }
}

fn render_message(message: &ChatMessage) -> String {
    let body = match &message.content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Structured(structured) => format!("[{} content]", structured.kind()),
    };
    let mut rendered = if message.is_user() {
        format!("You: {body}")
    } else {
        body
    };
    if !message.images.is_empty() {
        rendered.push_str(&format!("\n[{} attachment(s)]", message.images.len()));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::StructuredContent;
    use tempfile::TempDir;

    #[test]
    fn writes_messages_only_while_active() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chat.log");
        let path_str = path.to_string_lossy().into_owned();

        let mut log = TranscriptLog::new(None).expect("log");
        assert_eq!(log.get_status_string(), "disabled");
        assert!(log.toggle_logging().is_err());

        log.set_log_file(path_str).expect("enable");
        log.log_message(&ChatMessage::user("hello", vec!["data:image/png;base64,AA".into()]))
            .expect("write user");
        log.log_message(&ChatMessage::assistant("Hi there!\nHow can I help?"))
            .expect("write assistant");

        assert_eq!(log.toggle_logging().expect("pause"), format!("Logging paused (file: {})", path.display()));
        assert_eq!(log.get_status_string(), "paused (chat.log)");
        log.log_message(&ChatMessage::assistant("not logged")).expect("no-op");

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(
            contents,
            "You: hello\n[1 attachment(s)]\n\nHi there!\nHow can I help?\n\n## Logging paused\n\n"
        );
    }

    #[test]
    fn structured_content_is_summarized() {
        let message = ChatMessage::assistant(StructuredContent::Table { data: Vec::new() });
        assert_eq!(render_message(&message), "[table content]");
    }

    #[test]
    fn unwritable_path_is_rejected_up_front() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("missing").join("chat.log");
        assert!(TranscriptLog::new(Some(missing.to_string_lossy().into_owned())).is_err());
    }
}
