//! `multipart/form-data` parsing via `multer`.
//!
//! Parts with a missing or malformed `Content-Disposition` are skipped rather
//! than failing the whole request — lenient per the framework's handling of
//! malformed multipart input.

use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::BodyExt;

use crate::error::AppError;
use crate::request::Request;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, Vec<String>>,
    pub files: HashMap<String, Vec<UploadedFile>>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).and_then(|v| v.first())
    }
}

/// Parses `req`'s body as multipart form data. Requires the raw body stream to
/// still be available (fails if `body_bytes`/`multipart` already consumed it).
pub async fn parse(req: &Request) -> Result<MultipartForm, AppError> {
    let content_type = req
        .content_type()
        .ok_or_else(|| AppError::Validation("missing Content-Type header".to_string()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| AppError::Validation(format!("not a multipart request: {e}")))?;

    let incoming = req
        .take_incoming()
        .await
        .ok_or_else(|| AppError::Conflict("request body already consumed".to_string()))?;

    let stream = incoming.into_data_stream();
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = MultipartForm::default();
    let max_file_bytes = req.caps.max_file_bytes;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue; // no Content-Disposition `name` — lenient skip
        };

        if let Some(filename) = field.file_name().map(|s| s.to_string()) {
            let content_type = field.content_type().map(|m| m.to_string());
            let mut buf = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
            {
                if buf.len() + chunk.len() > max_file_bytes {
                    return Err(AppError::PayloadTooLarge("Payload Too Large".to_string()));
                }
                buf.extend_from_slice(&chunk);
            }
            form.files.entry(name).or_default().push(UploadedFile {
                filename,
                content_type,
                bytes: Bytes::from(buf),
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("malformed multipart field: {e}")))?;
            form.fields.entry(name).or_default().push(text);
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_returns_the_first_value_for_a_name() {
        let mut form = MultipartForm::default();
        form.fields.insert("tag".to_string(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(form.field("tag"), Some("a"));
        assert_eq!(form.field("missing"), None);
    }

    #[test]
    fn file_returns_the_first_uploaded_file_for_a_name() {
        let mut form = MultipartForm::default();
        form.files.insert(
            "avatar".to_string(),
            vec![UploadedFile {
                filename: "pic.png".to_string(),
                content_type: Some("image/png".to_string()),
                bytes: Bytes::from_static(b"fake-png"),
            }],
        );
        let file = form.file("avatar").unwrap();
        assert_eq!(file.filename, "pic.png");
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert!(form.file("missing").is_none());
    }
}
