pub mod classifier;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod prompts;

use classifier::{detect_smart_command, detect_tone, CommandKind, DetectedCommand};
use config::AppConfig;
use db::{ChatMessage, ChatSession, Idea, Reminder, Role, SmartNote, Store, UserProfile};
use dispatcher::ModelDispatcher;
use error::ChatError;
use gemini::GenerativeBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NEW_SESSION_TITLE: &str = "New Chat";
const SESSION_TITLE_CHARS: usize = 40;
const IDEA_TITLE_CHARS: usize = 50;

/// Record written as a side effect of a smart command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SavedRecord {
    Note(SmartNote),
    Idea(Idea),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnResult {
    pub session_id: String,
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    pub command: Option<DetectedCommand>,
    pub saved: Option<SavedRecord>,
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// The assistant application: chat pipeline plus the lists it feeds.
pub struct App {
    config: AppConfig,
    store: Store,
    dispatcher: ModelDispatcher,
}

impl App {
    pub fn new(config: AppConfig, store: Store, dispatcher: ModelDispatcher) -> Self {
        Self {
            config,
            store,
            dispatcher,
        }
    }

    /// Open the on-disk store and talk to the real model API.
    pub fn from_config(config: AppConfig) -> Result<Self, ChatError> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Store::open(&config.database_path)?;
        let dispatcher = ModelDispatcher::from_config(&config);
        Ok(Self::new(config, store, dispatcher))
    }

    /// Same as `from_config`, with the model transport supplied by the caller.
    pub fn with_backend(config: AppConfig, store: Store, backend: Arc<dyn GenerativeBackend>) -> Self {
        let dispatcher = ModelDispatcher::new(backend, config.api_key.clone())
            .with_candidates(config.candidates.clone())
            .with_attempt_timeout(config.attempt_timeout);
        Self::new(config, store, dispatcher)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ============ Sessions ============

    pub fn create_session(&self, user_id: &str) -> Result<ChatSession, ChatError> {
        let session = self.store.create_session(user_id, NEW_SESSION_TITLE)?;
        logging::log_chat(Some(&session.id), "Session created");
        Ok(session)
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.store.list_sessions(user_id)?)
    }

    pub fn session_messages(&self, user_id: &str, session_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        self.owned_session(user_id, session_id)?;
        Ok(self.store.get_session_messages(session_id)?)
    }

    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError> {
        if !self.store.delete_session(user_id, session_id)? {
            return Err(ChatError::SessionNotFound(session_id.to_string()));
        }
        logging::log_chat(Some(session_id), "Session deleted");
        Ok(())
    }

    fn owned_session(&self, user_id: &str, session_id: &str) -> Result<ChatSession, ChatError> {
        self.store
            .get_session(session_id)?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))
    }

    // ============ Send Message (Core Chat Pipeline) ============

    /// Run one user turn through classification, side effects, the model and persistence.
    ///
    /// Without a session id a new session is created, titled from `text`.
    pub async fn send_chat_message(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatTurnResult, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let session = match session_id {
            Some(id) => self.owned_session(user_id, id)?,
            None => {
                let session = self
                    .store
                    .create_session(user_id, &truncate_chars(trimmed, SESSION_TITLE_CHARS))?;
                logging::log_chat(Some(&session.id), "Session created on first send");
                session
            }
        };
        let session_id = session.id.as_str();
        let is_first_turn = self.store.count_session_messages(session_id)? == 0;

        // Classification looks at this message only
        let tone = detect_tone(trimmed);
        let command = detect_smart_command(trimmed);
        logging::log_classifier(
            Some(session_id),
            &format!(
                "tone={} command={}",
                tone,
                command.as_ref().map(|c| c.kind.as_str()).unwrap_or("none")
            ),
        );

        let user_message = ChatMessage::new(session_id, user_id, Role::User, trimmed, Some(tone));
        self.store.save_message(&user_message)?;

        let saved = match &command {
            Some(cmd) => self.apply_command(user_id, session_id, cmd)?,
            None => None,
        };

        let history = self.store.get_session_messages(session_id)?;
        let profile = self.store.get_profile(user_id)?;
        let reply = self
            .dispatcher
            .send_message(&history, profile.as_ref(), cancel)
            .await;

        let assistant_message = ChatMessage::new(
            session_id,
            user_id,
            Role::Assistant,
            &reply.content,
            Some(reply.tone),
        );
        self.store.save_message(&assistant_message)?;

        if is_first_turn {
            self.store
                .update_session_title(session_id, &truncate_chars(trimmed, SESSION_TITLE_CHARS))?;
        }

        logging::log_chat(
            Some(session_id),
            &format!("Turn complete, reply tone={}", reply.tone),
        );

        Ok(ChatTurnResult {
            session_id: session_id.to_string(),
            user_message,
            assistant_message,
            command,
            saved,
        })
    }

    /// Persist what a smart command asks for. Reminders are only acknowledged.
    fn apply_command(
        &self,
        user_id: &str,
        session_id: &str,
        command: &DetectedCommand,
    ) -> Result<Option<SavedRecord>, ChatError> {
        let content = command.extracted_content.as_str();
        match command.kind {
            CommandKind::Note => {
                let note = self.store.save_note(user_id, content, "chat")?;
                logging::log_store(Some(session_id), "Saved to Smart Notes");
                Ok(Some(SavedRecord::Note(note)))
            }
            CommandKind::Idea => {
                let idea = self
                    .store
                    .save_idea(user_id, &truncate_chars(content, IDEA_TITLE_CHARS), content)?;
                logging::log_store(Some(session_id), "Saved to Idea Vault");
                Ok(Some(SavedRecord::Idea(idea)))
            }
            CommandKind::Reminder => {
                logging::log_store(Some(session_id), "Reminder acknowledged, nothing stored");
                Ok(None)
            }
        }
    }

    // ============ Profile ============

    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ChatError> {
        Ok(self.store.get_profile(user_id)?)
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<(), ChatError> {
        self.store.save_profile(profile)?;
        Ok(())
    }

    // ============ Notes, Ideas, Reminders ============

    pub fn list_notes(&self, user_id: &str) -> Result<Vec<SmartNote>, ChatError> {
        Ok(self.store.list_notes(user_id)?)
    }

    pub fn list_ideas(&self, user_id: &str) -> Result<Vec<Idea>, ChatError> {
        Ok(self.store.list_ideas(user_id)?)
    }

    pub fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>, ChatError> {
        Ok(self.store.list_reminders(user_id)?)
    }

    pub fn add_reminder(&self, user_id: &str, title: &str, due_at: Option<&str>) -> Result<Reminder, ChatError> {
        Ok(self.store.add_reminder(user_id, title, due_at)?)
    }

    pub fn set_reminder_done(&self, user_id: &str, reminder_id: &str, done: bool) -> Result<bool, ChatError> {
        Ok(self.store.set_reminder_done(user_id, reminder_id, done)?)
    }
}
