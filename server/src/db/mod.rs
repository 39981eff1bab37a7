pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::error::Result;

pub use memory::MemoryStore;
pub use models::{Book, BookChanges, Note, NoteChanges, ReadingStatus, User, UserChanges};
pub use repository::{connect, MongoDbContext};

/// Persistence operations the handlers depend on.
///
/// Book and note lookups always take the owner id; a document owned by
/// somebody else is reported as absent.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Fails with `ApiError::Conflict` when the email is already registered.
    async fn create_user(&self, user: User) -> Result<User>;
    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, id: &ObjectId, changes: UserChanges) -> Result<Option<User>>;

    async fn list_books(
        &self,
        owner: &ObjectId,
        status: Option<ReadingStatus>,
    ) -> Result<Vec<Book>>;
    async fn create_book(&self, book: Book) -> Result<Book>;
    async fn find_book(&self, owner: &ObjectId, id: &ObjectId) -> Result<Option<Book>>;
    async fn update_book(
        &self,
        owner: &ObjectId,
        id: &ObjectId,
        changes: BookChanges,
    ) -> Result<Option<Book>>;
    /// Removes the book and every note attached to it.
    async fn delete_book(&self, owner: &ObjectId, id: &ObjectId) -> Result<bool>;

    async fn list_notes(&self, owner: &ObjectId, book_id: &ObjectId) -> Result<Vec<Note>>;
    async fn create_note(&self, note: Note) -> Result<Note>;
    async fn find_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
    ) -> Result<Option<Note>>;
    async fn update_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
        changes: NoteChanges,
    ) -> Result<Option<Note>>;
    async fn delete_note(&self, owner: &ObjectId, book_id: &ObjectId, id: &ObjectId)
        -> Result<bool>;
}
