use crate::classifier::ToneLabel;
use crate::error::UnknownLabel;
use crate::prompts::TonePreference;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Fixed-width UTC timestamp so text ordering matches time ordering.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(UnknownLabel::new("role", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub goals: Option<String>,
    pub tone_preference: Option<TonePreference>,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub tone_detected: Option<ToneLabel>, // fixed at creation
    pub created_at: String,
}

impl ChatMessage {
    pub fn new(session_id: &str, user_id: &str, role: Role, content: &str, tone: Option<ToneLabel>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            tone_detected: tone,
            created_at: now_timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SmartNote {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub source: String, // "chat" | "manual"
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Idea {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub due_at: Option<String>,
    pub is_done: bool,
    pub created_at: String,
}

const SCHEMA: &str = "
    -- Per-user assistant settings
    CREATE TABLE IF NOT EXISTS profiles (
        user_id TEXT PRIMARY KEY,
        full_name TEXT,
        goals TEXT,
        tone_preference TEXT,
        updated_at TEXT NOT NULL
    );

    -- Chat sessions, titled from their first user message
    CREATE TABLE IF NOT EXISTS chat_sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- Conversation turns with the tone detected when they were written
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        tone_detected TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);

    CREATE TABLE IF NOT EXISTS smart_notes (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT NOT NULL DEFAULT 'manual',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS idea_vault (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reminders (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        due_at TEXT,
        is_done INTEGER DEFAULT 0,
        created_at TEXT NOT NULL
    );
";

/// Local store for everything the assistant persists, one row set per user.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied that SQLite would keep
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    // ============ Profiles ============

    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT user_id, full_name, goals, tone_preference, updated_at FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let tone: Option<String> = row.get(3)?;
                    Ok(UserProfile {
                        user_id: row.get(0)?,
                        full_name: row.get(1)?,
                        goals: row.get(2)?,
                        tone_preference: tone.and_then(|t| t.parse().ok()),
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let now = now_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, full_name, goals, tone_preference, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    full_name = excluded.full_name,
                    goals = excluded.goals,
                    tone_preference = excluded.tone_preference,
                    updated_at = excluded.updated_at",
                params![
                    profile.user_id,
                    profile.full_name,
                    profile.goals,
                    profile.tone_preference.map(|t| t.as_str()),
                    now
                ],
            )?;
            Ok(())
        })
    }

    // ============ Sessions ============

    pub fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession> {
        let now = now_timestamp();
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO chat_sessions (id, user_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session.id, session.user_id, session.title, session.created_at, session.updated_at],
            )?;
            Ok(())
        })?;
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, user_id, title, created_at, updated_at FROM chat_sessions WHERE id = ?1",
                params![id],
                session_from_row,
            )
            .optional()
        })
    }

    /// Sessions for a user, most recently active first.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM chat_sessions
                 WHERE user_id = ?1
                 ORDER BY updated_at DESC, rowid DESC",
            )?;
            let sessions = stmt.query_map(params![user_id], session_from_row)?;
            sessions.collect()
        })
    }

    pub fn update_session_title(&self, id: &str, title: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE chat_sessions SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now, id],
            )?;
            Ok(())
        })
    }

    /// Delete a session and its messages. Returns false if the user owns no such session.
    pub fn delete_session(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE session_id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // ============ Messages ============

    pub fn save_message(&self, message: &ChatMessage) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, user_id, role, content, tone_detected, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id,
                    message.session_id,
                    message.user_id,
                    message.role.as_str(),
                    message.content,
                    message.tone_detected.map(|t| t.as_str()),
                    message.created_at
                ],
            )?;

            // Keep the session list ordered by activity
            conn.execute(
                "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2",
                params![now_timestamp(), message.session_id],
            )?;

            Ok(())
        })
    }

    /// All turns of a session in creation order.
    pub fn get_session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, user_id, role, content, tone_detected, created_at
                 FROM messages
                 WHERE session_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let messages = stmt.query_map(params![session_id], message_from_row)?;
            messages.collect()
        })
    }

    pub fn count_session_messages(&self, session_id: &str) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    // ============ Smart Notes ============

    pub fn save_note(&self, user_id: &str, content: &str, source: &str) -> Result<SmartNote> {
        let note = SmartNote {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            source: source.to_string(),
            created_at: now_timestamp(),
        };
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO smart_notes (id, user_id, content, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![note.id, note.user_id, note.content, note.source, note.created_at],
            )?;
            Ok(())
        })?;
        Ok(note)
    }

    pub fn list_notes(&self, user_id: &str) -> Result<Vec<SmartNote>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, content, source, created_at
                 FROM smart_notes WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let notes = stmt.query_map(params![user_id], |row| {
                Ok(SmartNote {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    content: row.get(2)?,
                    source: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            notes.collect()
        })
    }

    // ============ Idea Vault ============

    pub fn save_idea(&self, user_id: &str, title: &str, content: &str) -> Result<Idea> {
        let now = now_timestamp();
        let idea = Idea {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO idea_vault (id, user_id, title, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![idea.id, idea.user_id, idea.title, idea.content, idea.created_at, idea.updated_at],
            )?;
            Ok(())
        })?;
        Ok(idea)
    }

    pub fn list_ideas(&self, user_id: &str) -> Result<Vec<Idea>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, content, created_at, updated_at
                 FROM idea_vault WHERE user_id = ?1
                 ORDER BY updated_at DESC, rowid DESC",
            )?;
            let ideas = stmt.query_map(params![user_id], |row| {
                Ok(Idea {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?;
            ideas.collect()
        })
    }

    // ============ Reminders ============

    pub fn add_reminder(&self, user_id: &str, title: &str, due_at: Option<&str>) -> Result<Reminder> {
        let reminder = Reminder {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            due_at: due_at.map(str::to_string),
            is_done: false,
            created_at: now_timestamp(),
        };
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO reminders (id, user_id, title, due_at, is_done, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![reminder.id, reminder.user_id, reminder.title, reminder.due_at, reminder.created_at],
            )?;
            Ok(())
        })?;
        Ok(reminder)
    }

    /// Open reminders first, each group by due date (undated last).
    pub fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, due_at, is_done, created_at
                 FROM reminders WHERE user_id = ?1
                 ORDER BY is_done ASC, due_at IS NULL, due_at ASC, created_at ASC",
            )?;
            let reminders = stmt.query_map(params![user_id], |row| {
                Ok(Reminder {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    due_at: row.get(3)?,
                    is_done: row.get::<_, i64>(4)? != 0,
                    created_at: row.get(5)?,
                })
            })?;
            reminders.collect()
        })
    }

    pub fn set_reminder_done(&self, user_id: &str, id: &str, done: bool) -> Result<bool> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE reminders SET is_done = ?1 WHERE id = ?2 AND user_id = ?3",
                params![if done { 1 } else { 0 }, id, user_id],
            )?;
            Ok(updated > 0)
        })
    }
}

fn session_from_row(row: &Row<'_>) -> Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> Result<ChatMessage> {
    let role: String = row.get(3)?;
    let tone: Option<String> = row.get(5)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        role: role.parse().unwrap_or(Role::Assistant),
        content: row.get(4)?,
        tone_detected: tone.and_then(|t| t.parse().ok()),
        created_at: row.get(6)?,
    })
}
