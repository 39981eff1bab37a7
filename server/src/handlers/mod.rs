pub mod auth;
pub mod books;
pub mod notes;

use actix_web::HttpResponse;
use mongodb::bson::oid::ObjectId;

use crate::error::{ApiError, Result};

/// Terminal handler for anything no scope or route claimed.
pub async fn not_found() -> Result<HttpResponse> {
    Err(ApiError::RouteNotFound)
}

/// Malformed ids are reported like missing documents.
pub(crate) fn parse_id(raw: &str, kind: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::NotFound(format!("No {kind} with id {raw}")))
}

/// Trims `value` and checks its length in characters.
pub(crate) fn required_text(field: &str, value: &str, max_chars: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("Please provide {field}")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ApiError::BadRequest(format!(
            "{field} cannot be more than {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = ObjectId::new();
        assert_eq!(parse_id(&id.to_hex(), "book").unwrap(), id);

        let err = parse_id("not-an-id", "book").unwrap_err();
        assert_eq!(err.to_string(), "No book with id not-an-id");
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("title", "  Dune ", 10).unwrap(), "Dune");
        assert!(matches!(
            required_text("title", "   ", 10),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            required_text("title", "ÅÅÅÅ", 3),
            Err(ApiError::BadRequest(_))
        ));
        assert!(required_text("title", "ÅÅÅ", 3).is_ok());
    }
}
