use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{books::DeleteResponse, parse_id, required_text};
use crate::{
    db::{Note, NoteChanges, Store},
    error::{ApiError, Result},
    extract::CleanJson,
    middleware::AuthenticatedUser,
};

const MAX_CONTENT: usize = 10_000;

/// Note routes live under the books scope: `/{book_id}/notes/...`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_notes)
        .service(create_note)
        .service(get_note)
        .service(update_note)
        .service(delete_note);
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateNoteRequest {
    pub content: String,
    pub page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateNoteRequest {
    pub content: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct NoteInfo {
    pub id: String,
    pub book_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Note> for NoteInfo {
    fn from(note: Note) -> Self {
        Self {
            id: note.id.map(|id| id.to_hex()).unwrap_or_default(),
            book_id: note.book_id.to_hex(),
            content: note.content,
            page: note.page,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListResponse {
    pub success: bool,
    pub count: usize,
    pub notes: Vec<NoteInfo>,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub success: bool,
    pub note: NoteInfo,
}

/// Resolves the book id and confirms the caller owns the book.
async fn owned_book(store: &dyn Store, owner: &ObjectId, raw_id: &str) -> Result<ObjectId> {
    let book_id = parse_id(raw_id, "book")?;

    match store.find_book(owner, &book_id).await? {
        Some(_) => Ok(book_id),
        None => Err(ApiError::NotFound(format!("No book with id {raw_id}"))),
    }
}

#[get("/{book_id}/notes")]
pub async fn list_notes(
    identity: AuthenticatedUser,
    path: web::Path<String>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let book_id = owned_book(store.get_ref(), &identity.user_id, &path.into_inner()).await?;

    let notes: Vec<NoteInfo> = store
        .list_notes(&identity.user_id, &book_id)
        .await?
        .into_iter()
        .map(NoteInfo::from)
        .collect();

    Ok(HttpResponse::Ok().json(NoteListResponse {
        success: true,
        count: notes.len(),
        notes,
    }))
}

#[post("/{book_id}/notes")]
pub async fn create_note(
    identity: AuthenticatedUser,
    path: web::Path<String>,
    req: CleanJson<CreateNoteRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let book_id = owned_book(store.get_ref(), &identity.user_id, &path.into_inner()).await?;
    let req = req.into_inner();

    let mut note = Note::new(
        book_id,
        identity.user_id,
        required_text("content", &req.content, MAX_CONTENT)?,
    );
    note.page = req.page;

    let note = store.create_note(note).await?;
    log::debug!("Created note for book {}", book_id.to_hex());

    Ok(HttpResponse::Created().json(NoteResponse {
        success: true,
        note: note.into(),
    }))
}

#[get("/{book_id}/notes/{note_id}")]
pub async fn get_note(
    identity: AuthenticatedUser,
    path: web::Path<(String, String)>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let (raw_book_id, raw_note_id) = path.into_inner();
    let book_id = parse_id(&raw_book_id, "book")?;
    let note_id = parse_id(&raw_note_id, "note")?;

    let note = store
        .find_note(&identity.user_id, &book_id, &note_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No note with id {raw_note_id}")))?;

    Ok(HttpResponse::Ok().json(NoteResponse {
        success: true,
        note: note.into(),
    }))
}

#[put("/{book_id}/notes/{note_id}")]
pub async fn update_note(
    identity: AuthenticatedUser,
    path: web::Path<(String, String)>,
    req: CleanJson<UpdateNoteRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let (raw_book_id, raw_note_id) = path.into_inner();
    let book_id = parse_id(&raw_book_id, "book")?;
    let note_id = parse_id(&raw_note_id, "note")?;
    let req = req.into_inner();

    let changes = NoteChanges {
        content: req
            .content
            .as_deref()
            .map(|content| required_text("content", content, MAX_CONTENT))
            .transpose()?,
        page: req.page,
    };

    let note = store
        .update_note(&identity.user_id, &book_id, &note_id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No note with id {raw_note_id}")))?;

    Ok(HttpResponse::Ok().json(NoteResponse {
        success: true,
        note: note.into(),
    }))
}

#[delete("/{book_id}/notes/{note_id}")]
pub async fn delete_note(
    identity: AuthenticatedUser,
    path: web::Path<(String, String)>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let (raw_book_id, raw_note_id) = path.into_inner();
    let book_id = parse_id(&raw_book_id, "book")?;
    let note_id = parse_id(&raw_note_id, "note")?;

    if !store
        .delete_note(&identity.user_id, &book_id, &note_id)
        .await?
    {
        return Err(ApiError::NotFound(format!("No note with id {raw_note_id}")));
    }

    Ok(HttpResponse::Ok().json(DeleteResponse {
        success: true,
        message: "Note removed".to_string(),
    }))
}
