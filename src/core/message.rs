use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Rich payloads produced by the service. They are carried opaquely; rows are
/// kept as raw JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructuredContent {
    Graph { data: Vec<Value> },
    Table { data: Vec<Value> },
    Image { url: String },
    File { name: String, url: String },
}

impl StructuredContent {
    pub fn kind(&self) -> &'static str {
        match self {
            StructuredContent::Graph { .. } => "graph",
            StructuredContent::Table { .. } => "table",
            StructuredContent::Image { .. } => "image",
            StructuredContent::File { .. } => "file",
        }
    }
}

/// Either plain text or exactly one structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(StructuredContent),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Structured(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MessageContent::Text(_))
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<StructuredContent> for MessageContent {
    fn from(value: StructuredContent) -> Self {
        MessageContent::Structured(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    /// Data URLs of images the user attached to this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<MessageContent>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images,
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("system").is_err());
        assert_eq!(Role::try_from("assistant"), Ok(Role::Assistant));
    }

    #[test]
    fn structured_content_uses_type_tag() {
        let content = MessageContent::from(StructuredContent::File {
            name: "report.pdf".into(),
            url: "https://example.com/report.pdf".into(),
        });
        let value = serde_json::to_value(&content).expect("serialize");
        assert_eq!(
            value,
            json!({"type": "file", "name": "report.pdf", "url": "https://example.com/report.pdf"})
        );

        let parsed: MessageContent =
            serde_json::from_value(json!({"type": "graph", "data": [{"x": 1, "y": 2}]}))
                .expect("deserialize");
        match parsed {
            MessageContent::Structured(StructuredContent::Graph { data }) => {
                assert_eq!(data.len(), 1)
            }
            other => panic!("expected graph content, got {other:?}"),
        }
    }

    #[test]
    fn plain_strings_deserialize_as_text() {
        let parsed: ChatMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "hi"}))
                .expect("deserialize");
        assert_eq!(parsed.text(), Some("hi"));
        assert!(parsed.images.is_empty());
    }

    #[test]
    fn empty_image_list_is_omitted() {
        let message = ChatMessage::assistant("done");
        let value = serde_json::to_value(&message).expect("serialize");
        assert!(value.get("images").is_none());
        assert_eq!(value["role"], "assistant");
    }
}
