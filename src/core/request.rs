//! Composition of outbound generation requests.

use std::fmt;

use crate::api::{GenerationRequest, ImagePayload};
use crate::core::attachments::Attachment;
use crate::core::session::SessionId;
use crate::core::settings::InferenceSettings;

/// Hard client-side cap on prompt length, in characters.
pub const MAX_PROMPT_CHARS: usize = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Neither prompt text nor attachments were supplied.
    EmptyPrompt,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::EmptyPrompt => f.write_str("Nothing to send: enter a message or attach a file"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Truncates `prompt` to [`MAX_PROMPT_CHARS`] characters.
pub fn truncate_prompt(prompt: &str) -> &str {
    match prompt.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((byte_index, _)) => &prompt[..byte_index],
        None => prompt,
    }
}

pub fn build_request(
    prompt: &str,
    attachments: &[Attachment],
    system_prompt: &str,
    settings: &InferenceSettings,
    session_id: &SessionId,
) -> Result<GenerationRequest, RequestError> {
    if prompt.trim().is_empty() && attachments.is_empty() {
        return Err(RequestError::EmptyPrompt);
    }

    let image_data = attachments
        .iter()
        .enumerate()
        .map(|(index, attachment)| ImagePayload {
            data: attachment.data.clone(),
            id: index + 1,
        })
        .collect();

    Ok(GenerationRequest {
        prompt: truncate_prompt(prompt).to_string(),
        system_prompt: system_prompt.to_string(),
        session_id: session_id.to_string(),
        image_data,
        settings: settings.clone(),
    })
}
