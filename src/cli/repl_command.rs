//! Parsing of the lines typed into the interactive chat.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Plain text to send (possibly empty when only attachments are queued).
    Message(String),
    Attach(PathBuf),
    Paste,
    Files,
    /// 1-based position in the attachment list.
    Remove(usize),
    /// Show the system prompt, or replace it.
    System(Option<String>),
    Set { field: String, value: String },
    Settings,
    Metrics,
    /// Enable logging to a file, or toggle it when no file is given.
    Log(Option<String>),
    Session,
    Help,
    Quit,
    /// A known command used the wrong way; carries the usage line.
    Usage(&'static str),
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /attach <path>        Attach an image or file to the next message
  /paste                Attach every image on the clipboard
  /files                List pending attachments
  /remove <n>           Drop pending attachment n
  /system [text]        Show or replace the system prompt
  /set <field> <value>  Change an inference setting for this session
  /settings             Show every inference setting
  /metrics              Show the service's resource usage
  /log [file]           Log the conversation to a file, or pause/resume logging
  /session              Show the session id
  /help                 Show this help
  /quit                 Leave the chat
Lines starting with // are sent as text with the first slash removed.";

fn rest(argument: &str) -> Option<String> {
    let argument = argument.trim();
    (!argument.is_empty()).then(|| argument.to_string())
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let Some(command_line) = line.trim_start().strip_prefix('/') else {
        return ReplCommand::Message(line.to_string());
    };
    if command_line.starts_with('/') {
        return ReplCommand::Message(command_line.to_string());
    }

    let (name, argument) = command_line
        .split_once(char::is_whitespace)
        .unwrap_or((command_line, ""));

    match name.to_ascii_lowercase().as_str() {
        "attach" | "a" => match rest(argument) {
            Some(path) => ReplCommand::Attach(PathBuf::from(path)),
            None => ReplCommand::Usage("/attach <path>"),
        },
        "paste" => ReplCommand::Paste,
        "files" => ReplCommand::Files,
        "remove" | "rm" => match argument.trim().parse::<usize>() {
            Ok(index) if index > 0 => ReplCommand::Remove(index),
            _ => ReplCommand::Usage("/remove <n>  (n starts at 1)"),
        },
        "system" => ReplCommand::System(rest(argument)),
        "set" => {
            let mut parts = argument.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(field), Some(value), None) => ReplCommand::Set {
                    field: field.to_string(),
                    value: value.to_string(),
                },
                _ => ReplCommand::Usage("/set <field> <value>"),
            }
        }
        "settings" => ReplCommand::Settings,
        "metrics" => ReplCommand::Metrics,
        "log" => ReplCommand::Log(rest(argument)),
        "session" => ReplCommand::Session,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(parse_command("hello there\n"), ReplCommand::Message("hello there".into()));
        assert_eq!(parse_command(""), ReplCommand::Message(String::new()));
        assert_eq!(parse_command("//etc/hosts?"), ReplCommand::Message("/etc/hosts?".into()));
    }

    #[test]
    fn commands_take_arguments() {
        assert_eq!(
            parse_command("/attach ~/Pictures/my cat.png"),
            ReplCommand::Attach(PathBuf::from("~/Pictures/my cat.png"))
        );
        assert_eq!(parse_command("/remove 2"), ReplCommand::Remove(2));
        assert_eq!(
            parse_command("/set top_k 20"),
            ReplCommand::Set {
                field: "top_k".into(),
                value: "20".into()
            }
        );
        assert_eq!(
            parse_command("/system You answer briefly."),
            ReplCommand::System(Some("You answer briefly.".into()))
        );
        assert_eq!(parse_command("/system"), ReplCommand::System(None));
        assert_eq!(parse_command("/log"), ReplCommand::Log(None));
        assert_eq!(parse_command("/LOG chat.txt"), ReplCommand::Log(Some("chat.txt".into())));
        assert_eq!(parse_command("/quit"), ReplCommand::Quit);
    }

    #[test]
    fn misuse_reports_usage() {
        assert!(matches!(parse_command("/attach"), ReplCommand::Usage(_)));
        assert!(matches!(parse_command("/remove 0"), ReplCommand::Usage(_)));
        assert!(matches!(parse_command("/remove two"), ReplCommand::Usage(_)));
        assert!(matches!(parse_command("/set temperature"), ReplCommand::Usage(_)));
        assert_eq!(parse_command("/frobnicate"), ReplCommand::Unknown("frobnicate".into()));
    }
}
