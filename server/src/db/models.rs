use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, password: &str) -> Result<Self> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let now = Utc::now();

        Ok(Self {
            id: None,
            name,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn verify_password(&self, password: &str) -> Result<bool> {
        Ok(bcrypt::verify(password, &self.password_hash)?)
    }

    /// Spends the same bcrypt work as [`User::verify_password`] for an email
    /// with no account. Never matches.
    pub fn verify_missing(password: &str) -> bool {
        static PLACEHOLDER_HASH: OnceLock<String> = OnceLock::new();

        let hash = PLACEHOLDER_HASH.get_or_init(|| {
            bcrypt::hash("textmate-placeholder", bcrypt::DEFAULT_COST).unwrap_or_default()
        });
        let _ = bcrypt::verify(password, hash);
        false
    }

    pub fn apply(&mut self, changes: &UserChanges) {
        if let Some(name) = &changes.name {
            self.name = name.clone();
        }
        if let Some(email) = &changes.email {
            self.email = email.clone();
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    WantToRead,
    Reading,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub created_by: ObjectId,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ReadingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(created_by: ObjectId, title: String, author: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            created_by,
            title,
            author,
            description: None,
            status: ReadingStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: &BookChanges) {
        if let Some(title) = &changes.title {
            self.title = title.clone();
        }
        if let Some(author) = &changes.author {
            self.author = author.clone();
        }
        if let Some(description) = &changes.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BookChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReadingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub book_id: ObjectId,
    pub created_by: ObjectId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(book_id: ObjectId, created_by: ObjectId, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            book_id,
            created_by,
            content,
            page: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: &NoteChanges) {
        if let Some(content) = &changes.content {
            self.content = content.clone();
        }
        if let Some(page) = changes.page {
            self.page = Some(page);
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}
