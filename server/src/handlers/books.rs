use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{parse_id, required_text};
use crate::{
    db::{Book, BookChanges, ReadingStatus, Store},
    error::{ApiError, Result},
    extract::{CleanJson, CleanQuery},
    middleware::AuthenticatedUser,
};

const MAX_TITLE: usize = 200;
const MAX_AUTHOR: usize = 100;
const MAX_DESCRIPTION: usize = 2000;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_books)
        .service(create_book)
        .service(get_book)
        .service(update_book)
        .service(delete_book);
}

#[derive(Debug, Deserialize)]
pub struct ListBooksQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub status: Option<ReadingStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub status: Option<ReadingStatus>,
}

#[derive(Debug, Serialize)]
pub struct BookInfo {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ReadingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookInfo {
    fn from(book: Book) -> Self {
        Self {
            id: book.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: book.title,
            author: book.author,
            description: book.description,
            status: book.status,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub success: bool,
    pub count: usize,
    pub books: Vec<BookInfo>,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub success: bool,
    pub book: BookInfo,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

pub(crate) fn parse_status(raw: &str) -> Result<ReadingStatus> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| {
        ApiError::BadRequest(format!(
            "status must be one of want_to_read, reading, finished (got '{raw}')"
        ))
    })
}

fn optional_description(value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim) {
        None => Ok(None),
        Some(text) if text.chars().count() > MAX_DESCRIPTION => Err(ApiError::BadRequest(
            format!("description cannot be more than {MAX_DESCRIPTION} characters"),
        )),
        Some(text) => Ok(Some(text.to_string())),
    }
}

#[get("")]
pub async fn list_books(
    identity: AuthenticatedUser,
    query: CleanQuery<ListBooksQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let status = query
        .into_inner()
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;

    let books: Vec<BookInfo> = store
        .list_books(&identity.user_id, status)
        .await?
        .into_iter()
        .map(BookInfo::from)
        .collect();

    log::debug!(
        "Listed {} books for user {}",
        books.len(),
        identity.user_id.to_hex()
    );

    Ok(HttpResponse::Ok().json(BookListResponse {
        success: true,
        count: books.len(),
        books,
    }))
}

#[post("")]
pub async fn create_book(
    identity: AuthenticatedUser,
    req: CleanJson<CreateBookRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let mut book = Book::new(
        identity.user_id,
        required_text("title", &req.title, MAX_TITLE)?,
        required_text("author", &req.author, MAX_AUTHOR)?,
    );
    book.description = optional_description(req.description.as_deref())?;
    if let Some(status) = req.status {
        book.status = status;
    }

    let book = store.create_book(book).await?;

    Ok(HttpResponse::Created().json(BookResponse {
        success: true,
        book: book.into(),
    }))
}

#[get("/{book_id}")]
pub async fn get_book(
    identity: AuthenticatedUser,
    path: web::Path<String>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let raw_id = path.into_inner();
    let book_id = parse_id(&raw_id, "book")?;

    let book = store
        .find_book(&identity.user_id, &book_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No book with id {raw_id}")))?;

    Ok(HttpResponse::Ok().json(BookResponse {
        success: true,
        book: book.into(),
    }))
}

#[put("/{book_id}")]
pub async fn update_book(
    identity: AuthenticatedUser,
    path: web::Path<String>,
    req: CleanJson<UpdateBookRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let raw_id = path.into_inner();
    let book_id = parse_id(&raw_id, "book")?;
    let req = req.into_inner();

    let changes = BookChanges {
        title: req
            .title
            .as_deref()
            .map(|title| required_text("title", title, MAX_TITLE))
            .transpose()?,
        author: req
            .author
            .as_deref()
            .map(|author| required_text("author", author, MAX_AUTHOR))
            .transpose()?,
        description: optional_description(req.description.as_deref())?,
        status: req.status,
    };

    let book = store
        .update_book(&identity.user_id, &book_id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No book with id {raw_id}")))?;

    Ok(HttpResponse::Ok().json(BookResponse {
        success: true,
        book: book.into(),
    }))
}

#[delete("/{book_id}")]
pub async fn delete_book(
    identity: AuthenticatedUser,
    path: web::Path<String>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse> {
    let raw_id = path.into_inner();
    let book_id = parse_id(&raw_id, "book")?;

    if !store.delete_book(&identity.user_id, &book_id).await? {
        return Err(ApiError::NotFound(format!("No book with id {raw_id}")));
    }

    log::info!(
        "Deleted book {} for user {}",
        raw_id,
        identity.user_id.to_hex()
    );

    Ok(HttpResponse::Ok().json(DeleteResponse {
        success: true,
        message: "Book removed".to_string(),
    }))
}
