//! The chat session engine.
//!
//! [`ChatEngine`] owns everything one conversation needs: the session id, the
//! live settings, the system prompt, the transcript and the pending
//! attachments. Network work happens on tasks spawned by
//! [`ChatStreamService`]; their reports come back as [`StreamMessage`]s and
//! are applied one at a time by [`ChatEngine::handle_stream_message`], so all
//! state mutation stays on the owner's task.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::core::attachments::AttachmentQueue;
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::message::ChatMessage;
use crate::core::request::{build_request, RequestError};
use crate::core::session::SessionId;
use crate::core::settings::{
    InferenceSettings, SettingField, SettingValue, SettingsError, SettingsValidator,
};
use crate::core::transcript::MessageStore;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed(String),
}

impl TurnState {
    pub fn is_busy(&self) -> bool {
        matches!(self, TurnState::Sending | TurnState::Streaming)
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// The user turn was recorded; spawn the stream described here.
    Started(StreamParams),
    /// A turn is already in flight. Nothing changed.
    Busy,
    /// No prompt text and no attachments. Nothing changed.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(String),
    Failed(String),
    Busy,
    Empty,
}

pub struct ChatEngine {
    client: reqwest::Client,
    base_url: String,
    idle_timeout: Option<Duration>,
    session_id: SessionId,
    settings: SettingsValidator,
    system_prompt: String,
    messages: MessageStore,
    attachments: AttachmentQueue,
    state: TurnState,
    accumulator: String,
    current_stream_id: u64,
}

impl ChatEngine {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        session_id: SessionId,
        settings: SettingsValidator,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            idle_timeout: None,
            session_id,
            settings,
            system_prompt: String::new(),
            messages: MessageStore::new(),
            attachments: AttachmentQueue::new(),
            state: TurnState::Idle,
            accumulator: String::new(),
            current_stream_id: 0,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages.all()
    }

    /// Assistant text received so far in the current (or last) turn.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulator
    }

    pub fn attachments_mut(&mut self) -> &mut AttachmentQueue {
        &mut self.attachments
    }

    pub fn settings(&self) -> &InferenceSettings {
        self.settings.settings()
    }

    pub fn validate_and_set(
        &mut self,
        field: SettingField,
        value: SettingValue,
    ) -> Result<InferenceSettings, SettingsError> {
        self.settings.validate_and_set(field, value)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = system_prompt.into();
    }

    /// Starts a turn: drains the ready attachments, builds the request and
    /// records the user message before anything is sent.
    pub fn submit(&mut self, prompt: &str) -> SubmitOutcome {
        if self.is_busy() {
            debug!(stream_id = self.current_stream_id, "turn in flight; ignoring submit");
            return SubmitOutcome::Busy;
        }

        let attachments = self.attachments.drain();
        let request = match build_request(
            prompt,
            &attachments,
            &self.system_prompt,
            self.settings.settings(),
            &self.session_id,
        ) {
            Ok(request) => request,
            Err(RequestError::EmptyPrompt) => return SubmitOutcome::Empty,
        };

        let images = attachments.iter().map(|a| a.data_url()).collect();
        self.messages
            .append(ChatMessage::user(request.prompt.clone(), images));

        self.current_stream_id += 1;
        self.accumulator.clear();
        self.state = TurnState::Sending;
        debug!(
            stream_id = self.current_stream_id,
            attachments = attachments.len(),
            "turn started"
        );

        SubmitOutcome::Started(StreamParams {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            request,
            idle_timeout: self.idle_timeout,
            stream_id: self.current_stream_id,
        })
    }

    /// Applies one transport report. Returns `false` when the report belongs
    /// to a turn that is no longer in flight and was ignored.
    pub fn handle_stream_message(&mut self, message: StreamMessage, stream_id: u64) -> bool {
        if stream_id != self.current_stream_id || !self.is_busy() {
            debug!(stream_id, current = self.current_stream_id, "ignoring stale stream message");
            return false;
        }

        match message {
            StreamMessage::Started => self.state = TurnState::Streaming,
            StreamMessage::Chunk(content) => {
                self.state = TurnState::Streaming;
                self.accumulator.push_str(&content);
                self.messages
                    .replace_last_assistant_or_append(self.accumulator.clone());
            }
            StreamMessage::Error(message) => {
                error!(stream_id, error = %message, "turn failed");
                self.finish_turn(TurnState::Failed(message));
            }
            StreamMessage::End => self.finish_turn(TurnState::Completed),
        }
        true
    }

    fn finish_turn(&mut self, state: TurnState) {
        debug!(stream_id = self.current_stream_id, ?state, "turn finished");
        self.state = state;
        self.attachments.clear();
    }

    /// Drives one full turn: submit, spawn the stream, then apply reports
    /// until the turn ends. `on_event` sees every applied report.
    pub async fn run_turn<F>(
        &mut self,
        prompt: &str,
        service: &ChatStreamService,
        rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
        mut on_event: F,
    ) -> TurnOutcome
    where
        F: FnMut(&StreamMessage),
    {
        match self.submit(prompt) {
            SubmitOutcome::Started(params) => service.spawn_stream(params),
            SubmitOutcome::Busy => return TurnOutcome::Busy,
            SubmitOutcome::Empty => return TurnOutcome::Empty,
        }

        while self.is_busy() {
            let Some((message, stream_id)) = rx.recv().await else {
                self.finish_turn(TurnState::Failed("stream channel closed".to_string()));
                break;
            };
            let event = message.clone();
            if self.handle_stream_message(message, stream_id) {
                on_event(&event);
            }
        }

        match &self.state {
            TurnState::Failed(message) => TurnOutcome::Failed(message.clone()),
            _ => TurnOutcome::Completed(self.accumulator.clone()),
        }
    }
}
