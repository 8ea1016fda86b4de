use crate::config::DEFAULT_CACHE_CONTROL;
use crate::materialize::{CacheStatus, Rendition};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use std::path::Path;

/// MIME type of a served file. Sniffs the image format from magic bytes
/// first, since cached renditions keep the source basename even when `fm`
/// changed the encoded format; the file extension is only a fallback.
pub fn content_type_for(bytes: &[u8], path: &Path) -> String {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => {
            let guessed: mime::Mime = mime_guess::from_path(path).first_or_octet_stream();
            guessed.to_string()
        }
    }
}

/// Turn a materialized rendition into an HTTP response: body bytes, detected
/// content type, long-lived cache-control, and a hit/miss indicator when the
/// rendition went through the cache.
pub fn build(rendition: Rendition) -> Response {
    let content_type = content_type_for(&rendition.bytes, &rendition.file_path);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(DEFAULT_CACHE_CONTROL),
    );
    if let Some(status) = rendition.cache {
        let value = match status {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        };
        headers.insert("x-image-cache", HeaderValue::from_static(value));
    }

    (headers, Body::from(rendition.bytes)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sniffs_content_type_from_magic_bytes() {
        let img = image::DynamicImage::new_rgb8(4, 4);
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        // Basename says jpg, bytes say png; bytes win.
        let ct = content_type_for(&png, &PathBuf::from("cache/abc_photo.jpg"));
        assert_eq!(ct, "image/png");
    }

    #[test]
    fn falls_back_to_extension() {
        let ct = content_type_for(b"not an image", &PathBuf::from("photo.jpg"));
        assert_eq!(ct, "image/jpeg");
    }

    #[test]
    fn unknown_everything_is_octet_stream() {
        let ct = content_type_for(b"not an image", &PathBuf::from("mystery.bin"));
        assert_eq!(ct, "application/octet-stream");
    }
}
