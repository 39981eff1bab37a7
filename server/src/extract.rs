//! Request extractors that neutralise script injection before handlers see
//! any client-supplied text.

use std::collections::BTreeMap;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ApiError;

pub fn sanitize_str(input: &str) -> String {
    input.replace('<', "&lt;")
}

/// Sanitizes every string in `value`, object keys included.
pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::String(text) => {
            if text.contains('<') {
                *text = sanitize_str(text);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        Value::Object(map) => {
            let entries = std::mem::take(map);
            *map = entries
                .into_iter()
                .map(|(key, mut item)| {
                    sanitize_value(&mut item);
                    (sanitize_str(&key), item)
                })
                .collect::<Map<String, Value>>();
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// JSON body, sanitized, then deserialized into `T`.
#[derive(Debug)]
pub struct CleanJson<T>(pub T);

impl<T> CleanJson<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned + 'static> FromRequest for CleanJson<T> {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let body = web::Json::<Value>::from_request(req, payload);

        Box::pin(async move {
            let mut value = body.await?.into_inner();
            sanitize_value(&mut value);

            let parsed = serde_json::from_value(value)
                .map_err(|err| ApiError::BadRequest(format!("Invalid request body: {err}")))?;
            Ok(CleanJson(parsed))
        })
    }
}

/// Query string, sanitized, then deserialized into `T`. Every query value
/// is a string, so `T` should only use string-like fields.
#[derive(Debug)]
pub struct CleanQuery<T>(pub T);

impl<T> CleanQuery<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned + 'static> FromRequest for CleanQuery<T> {
    type Error = actix_web::Error;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        std::future::ready(parse_query(req.query_string()).map(CleanQuery))
    }
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, actix_web::Error> {
    let raw = web::Query::<BTreeMap<String, String>>::from_query(query)
        .map_err(|err| ApiError::BadRequest(format!("Invalid query string: {err}")))?
        .into_inner();

    let mut value = Value::Object(
        raw.into_iter()
            .map(|(key, item)| (key, Value::String(item)))
            .collect(),
    );
    sanitize_value(&mut value);

    serde_json::from_value(value)
        .map_err(|err| ApiError::BadRequest(format!("Invalid query string: {err}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_sanitize_nested_values() {
        let mut value = json!({
            "title": "<script>alert(1)</script>",
            "tags": ["ok", "<b>bold</b>"],
            "meta": { "<img>": "x < y", "page": 3, "draft": false }
        });

        sanitize_value(&mut value);

        assert_eq!(
            value,
            json!({
                "title": "&lt;script>alert(1)&lt;/script>",
                "tags": ["ok", "&lt;b>bold&lt;/b>"],
                "meta": { "&lt;img>": "x &lt; y", "page": 3, "draft": false }
            })
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        let mut value = json!("Dune & Children of Dune > 2");
        sanitize_value(&mut value);
        assert_eq!(value, json!("Dune & Children of Dune > 2"));
    }

    #[derive(Debug, Deserialize)]
    struct Body {
        content: String,
        page: Option<u32>,
    }

    #[actix_web::test]
    async fn test_clean_json_extractor() {
        let (req, mut payload) = TestRequest::post()
            .set_json(json!({ "content": "<script>x</script>", "page": 7 }))
            .to_http_parts();

        let CleanJson(body) = CleanJson::<Body>::from_request(&req, &mut payload)
            .await
            .unwrap();

        assert_eq!(body.content, "&lt;script>x&lt;/script>");
        assert_eq!(body.page, Some(7));
    }

    #[actix_web::test]
    async fn test_clean_json_rejects_wrong_shape() {
        let (req, mut payload) = TestRequest::post()
            .set_json(json!({ "page": "seven" }))
            .to_http_parts();

        let err = CleanJson::<Body>::from_request(&req, &mut payload)
            .await
            .unwrap_err();
        assert_eq!(err.as_response_error().status_code(), 400);
    }

    #[derive(Debug, Deserialize)]
    struct Filter {
        status: Option<String>,
    }

    #[test]
    fn test_clean_query() {
        let filter: Filter = parse_query("status=%3Cb%3Ereading").unwrap();
        assert_eq!(filter.status.as_deref(), Some("&lt;b>reading"));

        let empty: Filter = parse_query("").unwrap();
        assert!(empty.status.is_none());
    }
}
