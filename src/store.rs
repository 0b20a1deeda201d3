//! Durable conversation and message storage.
//!
//! The orchestrator depends only on the [`ConversationStore`] contract;
//! [`SledStore`] is the embedded implementation used by the terminal
//! front-end. Ephemeral transcript entries never reach this layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use ulid::Ulid;

use crate::error::{Result, TernError};
use crate::transcript::{MessageContent, Role};

/// Persisted conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConversation {
    /// Unique conversation identifier (ULID)
    pub id: Ulid,
    /// Owning user
    pub owner_id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Generated or user-assigned title; None until generated
    pub title: Option<String>,
}

/// Persisted message record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message identifier (ULID, sortable by creation time)
    pub id: Ulid,
    /// Owning conversation
    pub conversation_id: Ulid,
    /// Author role
    pub role: Role,
    /// Message body
    pub content: MessageContent,
    /// Owning user
    pub owner_id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Durable conversation/message gateway.
///
/// All operations are single-shot; a storage failure on the user-message
/// write aborts the turn before any capability dispatch.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return its id. Called at most once per
    /// conversation lifetime.
    async fn create_conversation(&self, owner_id: &str, title: Option<&str>) -> Result<Ulid>;

    /// Durably append one message.
    async fn insert_message(
        &self,
        conversation_id: Ulid,
        role: Role,
        content: &MessageContent,
        owner_id: &str,
    ) -> Result<()>;

    /// All messages of a conversation, ordered by creation.
    async fn list_messages(&self, conversation_id: Ulid) -> Result<Vec<StoredMessage>>;

    /// Fetch a conversation record.
    async fn get_conversation(&self, conversation_id: Ulid) -> Result<Option<StoredConversation>>;

    /// Set the conversation title. Invoked only by the title generation
    /// trigger or an explicit rename, never by the orchestrator directly.
    async fn set_title(&self, conversation_id: Ulid, title: &str) -> Result<()>;
}

/// Embedded sled-backed store.
///
/// Conversations live in one tree keyed by ULID; messages live in another,
/// keyed `"{conversation_id}/{message_id}"` so a prefix scan yields them in
/// creation order.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Storage`] if the database cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| TernError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// In-memory store for tests and ephemeral sessions.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| TernError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    fn conversations(&self) -> Result<sled::Tree> {
        self.db
            .open_tree("conversations")
            .map_err(|e| TernError::Storage(format!("Failed to open tree: {}", e)).into())
    }

    fn messages(&self) -> Result<sled::Tree> {
        self.db
            .open_tree("messages")
            .map_err(|e| TernError::Storage(format!("Failed to open tree: {}", e)).into())
    }

    fn load_conversation(&self, conversation_id: Ulid) -> Result<Option<StoredConversation>> {
        let tree = self.conversations()?;
        let value = tree
            .get(conversation_id.to_string().as_bytes())
            .map_err(|e| TernError::Storage(format!("Read failed: {}", e)))?;
        match value {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| TernError::Storage(format!("Deserialization failed: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn save_conversation(&self, record: &StoredConversation) -> Result<()> {
        let tree = self.conversations()?;
        let value = serde_json::to_vec(record)
            .map_err(|e| TernError::Storage(format!("Serialization failed: {}", e)))?;
        tree.insert(record.id.to_string().as_bytes(), value)
            .map_err(|e| TernError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| TernError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SledStore {
    async fn create_conversation(&self, owner_id: &str, title: Option<&str>) -> Result<Ulid> {
        let record = StoredConversation {
            id: Ulid::new(),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
            title: title.map(str::to_string),
        };
        self.save_conversation(&record)?;
        tracing::debug!(conversation_id = %record.id, "conversation created");
        Ok(record.id)
    }

    async fn insert_message(
        &self,
        conversation_id: Ulid,
        role: Role,
        content: &MessageContent,
        owner_id: &str,
    ) -> Result<()> {
        if self.load_conversation(conversation_id)?.is_none() {
            return Err(TernError::Storage(format!(
                "conversation {} does not exist",
                conversation_id
            ))
            .into());
        }

        let record = StoredMessage {
            id: Ulid::new(),
            conversation_id,
            role,
            content: content.clone(),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
        };

        let key = format!("{}/{}", conversation_id, record.id);
        let value = serde_json::to_vec(&record)
            .map_err(|e| TernError::Storage(format!("Serialization failed: {}", e)))?;
        self.messages()?
            .insert(key.as_bytes(), value)
            .map_err(|e| TernError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| TernError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Ulid) -> Result<Vec<StoredMessage>> {
        let prefix = format!("{}/", conversation_id);
        let mut messages = Vec::new();
        for entry in self.messages()?.scan_prefix(prefix.as_bytes()) {
            let (_, value) =
                entry.map_err(|e| TernError::Storage(format!("Scan failed: {}", e)))?;
            let record: StoredMessage = serde_json::from_slice(&value)
                .map_err(|e| TernError::Storage(format!("Deserialization failed: {}", e)))?;
            messages.push(record);
        }
        // ULID keys are time-ordered; created_at breaks same-millisecond ties.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn get_conversation(&self, conversation_id: Ulid) -> Result<Option<StoredConversation>> {
        self.load_conversation(conversation_id)
    }

    async fn set_title(&self, conversation_id: Ulid, title: &str) -> Result<()> {
        let mut record = self.load_conversation(conversation_id)?.ok_or_else(|| {
            TernError::Storage(format!("conversation {} does not exist", conversation_id))
        })?;
        record.title = Some(title.to_string());
        self.save_conversation(&record)
    }
}
