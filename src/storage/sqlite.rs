use super::types::{ChatMessage, Conversation, ConversationSummary, NewMessage, Role, DEFAULT_TITLE};
use super::{ConversationStore, StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at, is_archived";
const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, metadata, tokens_used, model_used, created_at";

/// SQLite-backed conversation store
///
/// Opens a fresh connection per operation so the store can be shared across
/// threads without a connection lock; SQLite serializes the writes.
pub struct SqliteConversationStore {
    db_path: PathBuf,
}

impl SqliteConversationStore {
    /// Create a store in the user's data directory
    ///
    /// `HORIZON_DB_PATH` overrides the location.
    pub fn new() -> StoreResult<Self> {
        if let Ok(override_path) = std::env::var("HORIZON_DB_PATH") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("org", "horizon", "horizon")
            .ok_or_else(|| StoreError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("conversations.db"))
    }

    /// Create a store backed by the given database file
    ///
    /// # Examples
    ///
    /// ```
    /// use horizon::storage::SqliteConversationStore;
    ///
    /// let dir = std::env::temp_dir().join("horizon-doc");
    /// let store = SqliteConversationStore::new_with_path(dir.join("chat.db")).unwrap();
    /// assert!(store.db_path().ends_with("chat.db"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> StoreResult<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!(
                    "Failed to create parent directory for database: {}",
                    e
                ))
            })?;
        }

        let store = Self { db_path };
        store.init()?;
        tracing::debug!("Conversation store ready at {}", store.db_path.display());
        Ok(store)
    }

    /// Location of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.db_path).map_err(storage("Failed to open database"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage("Failed to set busy timeout"))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(storage("Failed to enable foreign keys"))?;
        Ok(conn)
    }

    fn init(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                is_archived INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_user
                ON conversations (user_id, updated_at);
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL
                    REFERENCES conversations (id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                tokens_used INTEGER NOT NULL DEFAULT 0,
                model_used TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, seq);",
        )
        .map_err(storage("Failed to create tables"))?;
        Ok(())
    }
}

impl ConversationStore for SqliteConversationStore {
    fn create_conversation(&self, user_id: &str, title: Option<&str>) -> StoreResult<Conversation> {
        let conn = self.connect()?;
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            is_archived: false,
        };

        conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at, is_archived)
            VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                conversation.id,
                conversation.user_id,
                conversation.title,
                timestamp(&now),
                timestamp(&now)
            ],
        )
        .map_err(storage("Failed to insert conversation"))?;

        Ok(conversation)
    }

    fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.user_id, c.title, c.created_at, c.updated_at, c.is_archived,
                    COUNT(m.seq), MAX(m.created_at)
                FROM conversations c
                LEFT JOIN messages m ON m.conversation_id = c.id
                WHERE c.user_id = ?1 AND c.is_archived = 0
                GROUP BY c.id
                ORDER BY c.updated_at DESC, c.rowid DESC",
            )
            .map_err(storage("Failed to prepare statement"))?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                let conversation = conversation_from_row(row)?;
                let message_count: i64 = row.get(6)?;
                let last_message_at: Option<String> = row.get(7)?;
                let last_message_at = last_message_at
                    .map(|s| parse_timestamp(7, &s))
                    .transpose()?;
                Ok(ConversationSummary {
                    conversation,
                    message_count: message_count.max(0) as usize,
                    last_message_at,
                })
            })
            .map_err(storage("Failed to query conversations"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Failed to read conversation row"))
    }

    fn get_conversation(&self, conversation_id: &str, user_id: &str) -> StoreResult<Conversation> {
        let conn = self.connect()?;
        owned_conversation(&conn, conversation_id, user_id)
    }

    fn get_messages(&self, conversation_id: &str, user_id: &str) -> StoreResult<Vec<ChatMessage>> {
        let conn = self.connect()?;
        owned_conversation(&conn, conversation_id, user_id)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq ASC",
                MESSAGE_COLUMNS
            ))
            .map_err(storage("Failed to prepare statement"))?;

        let rows = stmt
            .query_map(params![conversation_id], message_from_row)
            .map_err(storage("Failed to query messages"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Failed to read message row"))
    }

    fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> StoreResult<ChatMessage> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(storage("Failed to start transaction"))?;

        find_conversation(&tx, conversation_id)?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", conversation_id)))?;

        let now = Utc::now();
        let stored = ChatMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            tokens_used: message.tokens_used,
            model_used: message.model_used,
            created_at: now,
        };
        let metadata_json = serde_json::to_string(&stored.metadata)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize metadata: {}", e)))?;

        tx.execute(
            "INSERT INTO messages
                (id, conversation_id, role, content, metadata, tokens_used, model_used, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                stored.id,
                stored.conversation_id,
                stored.role.as_str(),
                stored.content,
                metadata_json,
                i64::try_from(stored.tokens_used).unwrap_or(i64::MAX),
                stored.model_used,
                timestamp(&now)
            ],
        )
        .map_err(storage("Failed to insert message"))?;

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![timestamp(&now), conversation_id],
        )
        .map_err(storage("Failed to touch conversation"))?;

        tx.commit().map_err(storage("Failed to commit transaction"))?;
        Ok(stored)
    }

    fn rename_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        title: &str,
    ) -> StoreResult<Conversation> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(storage("Failed to start transaction"))?;

        let mut conversation = owned_conversation(&tx, conversation_id, user_id)?;
        let now = Utc::now();

        tx.execute(
            "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            params![title, timestamp(&now), conversation_id, user_id],
        )
        .map_err(storage("Failed to update conversation"))?;

        tx.commit().map_err(storage("Failed to commit transaction"))?;

        conversation.title = title.to_string();
        conversation.updated_at = now;
        Ok(conversation)
    }

    fn delete_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> StoreResult<Conversation> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(storage("Failed to start transaction"))?;

        let conversation = owned_conversation(&tx, conversation_id, user_id)?;

        tx.execute(
            "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
        )
        .map_err(storage("Failed to delete conversation"))?;

        tx.commit().map_err(storage("Failed to commit transaction"))?;
        Ok(conversation)
    }
}

/// Look up a conversation without an ownership check
fn find_conversation(conn: &Connection, conversation_id: &str) -> StoreResult<Option<Conversation>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM conversations WHERE id = ?1",
            CONVERSATION_COLUMNS
        ),
        params![conversation_id],
        conversation_from_row,
    )
    .optional()
    .map_err(storage("Failed to query conversation"))
}

fn owned_conversation(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> StoreResult<Conversation> {
    match find_conversation(conn, conversation_id)? {
        None => Err(StoreError::NotFound(format!(
            "conversation {}",
            conversation_id
        ))),
        Some(conversation) if conversation.user_id != user_id => {
            tracing::warn!(
                conversation_id,
                user_id,
                "Rejected access to a conversation owned by another user"
            );
            Err(StoreError::AccessDenied(format!(
                "conversation {}",
                conversation_id
            )))
        }
        Some(conversation) => Ok(conversation),
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    let is_archived: i64 = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
        updated_at: parse_timestamp(4, &updated_at)?,
        is_archived: is_archived != 0,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
    let metadata: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let tokens_used: i64 = row.get(5)?;
    let created_at: String = row.get(7)?;

    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        metadata,
        tokens_used: tokens_used.max(0) as u64,
        model_used: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

/// Fixed-width RFC 3339 so lexical order in SQL matches time order
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn storage(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| StoreError::Storage(format!("{}: {}", context, e))
}
