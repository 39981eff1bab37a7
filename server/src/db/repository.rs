use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, to_document, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};

use super::models::{Book, BookChanges, Note, NoteChanges, ReadingStatus, User, UserChanges};
use super::Store;
use crate::error::{ApiError, Result};

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);
const DUPLICATE_KEY: i32 = 11000;

/// Builds a client for `uri` and waits for the deployment to answer a ping.
/// The driver connects lazily, so the ping is what proves reachability.
pub async fn connect(uri: &str, database_name: &str) -> Result<MongoDbContext> {
    let mut options = ClientOptions::parse(uri).await?;
    options.app_name = Some("textmate-server".to_string());
    options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

    let client = Client::with_options(options)?;
    let context = MongoDbContext::new(client, database_name);
    context.ping().await?;

    Ok(context)
}

#[derive(Clone)]
pub struct MongoDbContext {
    db: Database,
}

impl MongoDbContext {
    pub fn new(client: Client, database_name: &str) -> Self {
        Self {
            db: client.database(database_name),
        }
    }

    pub fn users(&self) -> UserRepository {
        UserRepository {
            collection: self.db.collection("users"),
        }
    }

    pub fn books(&self) -> BookRepository {
        BookRepository {
            collection: self.db.collection("books"),
        }
    }

    pub fn notes(&self) -> NoteRepository {
        NoteRepository {
            collection: self.db.collection("notes"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<User>("users")
            .create_index(email_index)
            .await?;

        let owner_index = IndexModel::builder()
            .keys(doc! { "created_by": 1 })
            .build();

        self.db
            .collection::<Book>("books")
            .create_index(owner_index)
            .await?;

        let book_index = IndexModel::builder()
            .keys(doc! { "book_id": 1, "created_by": 1 })
            .build();

        self.db
            .collection::<Note>("notes")
            .create_index(book_index)
            .await?;

        log::info!("Database indexes created successfully");
        Ok(())
    }
}

/// Inserts report a clash as a write error; `findAndModify` reports it as a
/// command error.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn email_conflict(err: mongodb::error::Error) -> ApiError {
    if is_duplicate_key(&err) {
        ApiError::Conflict("Email already in use".to_string())
    } else {
        err.into()
    }
}

/// `$set` document for a partial update, stamping `updated_at`.
fn set_changes<T: Serialize>(changes: &T) -> Result<Document> {
    let mut set = to_document(changes)?;
    set.insert("updated_at", to_bson(&Utc::now())?);
    Ok(doc! { "$set": set })
}

async fn collect<T>(collection: &Collection<T>, filter: Document, sort: Document) -> Result<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut cursor = collection.find(filter).sort(sort).await?;

    let mut items = Vec::new();
    while let Some(item) = cursor.try_next().await? {
        items.push(item);
    }

    Ok(items)
}

#[derive(Clone)]
pub struct UserRepository {
    collection: Collection<User>,
}

impl UserRepository {
    pub async fn insert(&self, mut user: User) -> Result<User> {
        let result = self
            .collection
            .insert_one(&user)
            .await
            .map_err(email_conflict)?;

        user.id = result.inserted_id.as_object_id();
        Ok(user)
    }

    pub async fn find_by_id(&self, id: &ObjectId) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    pub async fn update(&self, id: &ObjectId, changes: &UserChanges) -> Result<Option<User>> {
        self.collection
            .find_one_and_update(doc! { "_id": id }, set_changes(changes)?)
            .return_document(ReturnDocument::After)
            .await
            .map_err(email_conflict)
    }
}

#[derive(Clone)]
pub struct BookRepository {
    collection: Collection<Book>,
}

impl BookRepository {
    pub async fn find_by_owner(
        &self,
        owner: &ObjectId,
        status: Option<ReadingStatus>,
    ) -> Result<Vec<Book>> {
        let mut filter = doc! { "created_by": owner };
        if let Some(status) = status {
            filter.insert("status", to_bson(&status)?);
        }

        collect(&self.collection, filter, doc! { "_id": -1 }).await
    }

    pub async fn insert(&self, mut book: Book) -> Result<Book> {
        let result = self.collection.insert_one(&book).await?;
        book.id = result.inserted_id.as_object_id();
        Ok(book)
    }

    pub async fn find(&self, owner: &ObjectId, id: &ObjectId) -> Result<Option<Book>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "created_by": owner })
            .await?)
    }

    pub async fn update(
        &self,
        owner: &ObjectId,
        id: &ObjectId,
        changes: &BookChanges,
    ) -> Result<Option<Book>> {
        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id, "created_by": owner }, set_changes(changes)?)
            .return_document(ReturnDocument::After)
            .await?)
    }

    pub async fn delete(&self, owner: &ObjectId, id: &ObjectId) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "created_by": owner })
            .await?;
        Ok(result.deleted_count > 0)
    }
}

#[derive(Clone)]
pub struct NoteRepository {
    collection: Collection<Note>,
}

impl NoteRepository {
    pub async fn find_by_book(&self, owner: &ObjectId, book_id: &ObjectId) -> Result<Vec<Note>> {
        collect(
            &self.collection,
            doc! { "book_id": book_id, "created_by": owner },
            doc! { "_id": 1 },
        )
        .await
    }

    pub async fn insert(&self, mut note: Note) -> Result<Note> {
        let result = self.collection.insert_one(&note).await?;
        note.id = result.inserted_id.as_object_id();
        Ok(note)
    }

    pub async fn find(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
    ) -> Result<Option<Note>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id, "book_id": book_id, "created_by": owner })
            .await?)
    }

    pub async fn update(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
        changes: &NoteChanges,
    ) -> Result<Option<Note>> {
        Ok(self
            .collection
            .find_one_and_update(
                doc! { "_id": id, "book_id": book_id, "created_by": owner },
                set_changes(changes)?,
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    pub async fn delete(&self, owner: &ObjectId, book_id: &ObjectId, id: &ObjectId) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "book_id": book_id, "created_by": owner })
            .await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn delete_for_book(&self, owner: &ObjectId, book_id: &ObjectId) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "book_id": book_id, "created_by": owner })
            .await?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl Store for MongoDbContext {
    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn create_user(&self, user: User) -> Result<User> {
        self.users().insert(user).await
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>> {
        self.users().find_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users().find_by_email(email).await
    }

    async fn update_user(&self, id: &ObjectId, changes: UserChanges) -> Result<Option<User>> {
        self.users().update(id, &changes).await
    }

    async fn list_books(
        &self,
        owner: &ObjectId,
        status: Option<ReadingStatus>,
    ) -> Result<Vec<Book>> {
        self.books().find_by_owner(owner, status).await
    }

    async fn create_book(&self, book: Book) -> Result<Book> {
        self.books().insert(book).await
    }

    async fn find_book(&self, owner: &ObjectId, id: &ObjectId) -> Result<Option<Book>> {
        self.books().find(owner, id).await
    }

    async fn update_book(
        &self,
        owner: &ObjectId,
        id: &ObjectId,
        changes: BookChanges,
    ) -> Result<Option<Book>> {
        self.books().update(owner, id, &changes).await
    }

    async fn delete_book(&self, owner: &ObjectId, id: &ObjectId) -> Result<bool> {
        if !self.books().delete(owner, id).await? {
            return Ok(false);
        }

        let removed = self.notes().delete_for_book(owner, id).await?;
        log::debug!("Removed {} notes with book {}", removed, id.to_hex());
        Ok(true)
    }

    async fn list_notes(&self, owner: &ObjectId, book_id: &ObjectId) -> Result<Vec<Note>> {
        self.notes().find_by_book(owner, book_id).await
    }

    async fn create_note(&self, note: Note) -> Result<Note> {
        self.notes().insert(note).await
    }

    async fn find_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
    ) -> Result<Option<Note>> {
        self.notes().find(owner, book_id, id).await
    }

    async fn update_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
        changes: NoteChanges,
    ) -> Result<Option<Note>> {
        self.notes().update(owner, book_id, id, &changes).await
    }

    async fn delete_note(
        &self,
        owner: &ObjectId,
        book_id: &ObjectId,
        id: &ObjectId,
    ) -> Result<bool> {
        self.notes().delete(owner, book_id, id).await
    }
}
