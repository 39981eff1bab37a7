use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;

use super::models::{Book, BookChanges, Note, NoteChanges, ReadingStatus, User, UserChanges};
use super::Store;
use crate::error::{ApiError, Result};

/// Process-local `Store` with the same ownership rules as the MongoDB one.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<ObjectId, User>>,
    // email -> user id
    emails: Arc<DashMap<String, ObjectId>>,
    books: Arc<DashMap<ObjectId, Book>>,
    notes: Arc<DashMap<ObjectId, Note>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_user(&self, mut user: User) -> Result<User> {
        let id = ObjectId::new();
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(ApiError::Conflict("Email already in use".to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        user.id = Some(id);
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>> {
        Ok(self.users.get(id).map(|user| user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let id = match self.emails.get(email) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.find_user(&id).await
    }

    async fn update_user(&self, id: &ObjectId, changes: UserChanges) -> Result<Option<User>> {
        let old_email = match self.users.get(id) {
            Some(user) => user.email.clone(),
            None => return Ok(None),
        };

        if let Some(email) = changes.email.as_ref().filter(|email| **email != old_email) {
            match self.emails.entry(email.clone()) {
                Entry::Occupied(_) => {
                    return Err(ApiError::Conflict("Email already in use".to_string()))
                }
                Entry::Vacant(slot) => {
                    slot.insert(*id);
                }
            }
            self.emails.remove(&old_email);
        }

        Ok(self.users.get_mut(id).map(|mut user| {
            user.apply(&changes);
            user.clone()
        }))
    }

    async fn list_books(
        &self,
        owner: &ObjectId,
        status: Option<ReadingStatus>,
    ) -> Result<Vec<Book>> {
        let mut books: Vec<Book> = self
            .books
            .iter()
            .filter(|book| book.created_by == *owner)
            .filter(|book| status.map_or(true, |status| book.status == status))
            .map(|book| book.clone())
            .collect();

        books.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(books)
    }

    async fn create_book(&self, mut book: Book) -> Result<Book> {
        let id = ObjectId::new();
        book.id = Some(id);
        self.books.insert(id, book.clone());
        Ok(book)
    }

    async fn find_book(&self, owner: &ObjectId, id: &ObjectId) -> Result<Option<Book>> {
        Ok(self
            .books
            .get(id)
            .filter(|book| book.created_by == *owner)
            .map(|book| book.clone()))
    }

    async fn update_book(
        &self,
        owner: &ObjectId,
        id: &ObjectId,
        changes: BookChanges,
    ) -> Result<Option<Book>> {
        Ok(self
            .books
            .get_mut(id)
            .filter(|book| book.created_by == *owner)
            .map(|mut book| {
                book.apply(&changes);
                book.clone()
            }))
    }

    async fn delete_book(&self, owner: &ObjectId, id: &ObjectId) -> Result<bool> {
        let removed = self
            .books
            .remove_if(id, |_, book| book.created_by == *owner)
            .is_some();

        if removed {
            self.notes.retain(|_, note| note.book_id != *id);
        }

        Ok(removed)
    }

    async fn list_notes(&self, owner: &ObjectId, book_id: &ObjectId) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .notes
            .iter()
            .filter(|note| note.book_id == *book_id && note.created_by == *owner)
            .map(|note| note.clone())
            .collect();

        notes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(notes)
    }

    async fn create_note(&self, mut note: Note) -> Result<Note> {
        let id = ObjectId::new();
        note.id = Some(id);
        self.notes.insert(id, note.clone());
        Ok(note)
    }

    async fn find_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
    ) -> Result<Option<Note>> {
        Ok(self
            .notes
            .get(id)
            .filter(|note| note.book_id == *book_id && note.created_by == *owner)
            .map(|note| note.clone()))
    }

    async fn update_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
        changes: NoteChanges,
    ) -> Result<Option<Note>> {
        Ok(self
            .notes
            .get_mut(id)
            .filter(|note| note.book_id == *book_id && note.created_by == *owner)
            .map(|mut note| {
                note.apply(&changes);
                note.clone()
            }))
    }

    async fn delete_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
    ) -> Result<bool> {
        Ok(self
            .notes
            .remove_if(id, |_, note| {
                note.book_id == *book_id && note.created_by == *owner
            })
            .is_some())
    }
}
