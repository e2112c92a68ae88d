//! Multipart media uploads backing template URLs.

use axum::extract::{Multipart, State};
use axum::Json;
use uuid::Uuid;

use crate::error::{AdminError, Result};
use crate::state::AppState;

/// Accept a `{kind, file}` multipart form and store the file under the
/// uploads directory as `<uuid>.<ext>`. Stickers are always stored as
/// `.webp`; other kinds fall back to a sensible default extension when the
/// original name has none.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut kind = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AdminError::BadRequest(format!("multipart parse failed: {err}")))?
    {
        match field.name() {
            Some("kind") => {
                kind = field
                    .text()
                    .await
                    .map_err(|err| AdminError::BadRequest(err.to_string()))?
                    .trim()
                    .to_string();
            }
            Some("file") => {
                let original = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AdminError::BadRequest(err.to_string()))?;
                file = Some((original, data.to_vec()));
            }
            _ => {}
        }
    }

    let Some((original, data)) = file else {
        return Err(AdminError::BadRequest("file missing".into()));
    };

    let ext = extension_for(&kind, &original)?;

    tokio::fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|err| AdminError::Internal(format!("create uploads dir: {err}")))?;

    let file_name = format!("{}{}", Uuid::new_v4(), ext);
    let path = state.uploads_dir.join(&file_name);
    tokio::fs::write(&path, &data)
        .await
        .map_err(|err| AdminError::Internal(format!("save file: {err}")))?;

    Ok(Json(serde_json::json!({
        "url": format!("/uploads/{file_name}"),
        "mimetype": mimetype_for(&kind, ext),
    })))
}

fn original_extension(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn extension_for(kind: &str, original_name: &str) -> Result<&'static str> {
    let ext = original_extension(original_name);
    let ext: &'static str = match kind {
        "image" => known_or(&ext, &[".jpg", ".jpeg", ".png", ".webp"], ".jpg"),
        "video" => known_or(&ext, &[".mp4", ".mov", ".mkv"], ".mp4"),
        "audio" => known_or(&ext, &[".mp3", ".ogg", ".wav", ".m4a"], ".mp3"),
        // Platform stickers are webp regardless of what was uploaded.
        "sticker" => ".webp",
        "doc" => known_or(&ext, &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".txt"], ".pdf"),
        _ => return Err(AdminError::BadRequest("invalid kind".into())),
    };
    Ok(ext)
}

fn known_or(ext: &str, known: &[&'static str], fallback: &'static str) -> &'static str {
    known
        .iter()
        .find(|candidate| **candidate == ext)
        .copied()
        .unwrap_or(fallback)
}

fn mimetype_for(kind: &str, ext: &'static str) -> &'static str {
    match (kind, ext) {
        ("image", ".jpg") | ("image", ".jpeg") => "image/jpeg",
        ("image", ".png") => "image/png",
        ("image", ".webp") | ("sticker", _) => "image/webp",
        ("video", ".mp4") => "video/mp4",
        ("video", ".mov") => "video/quicktime",
        ("video", ".mkv") => "video/x-matroska",
        ("audio", ".mp3") => "audio/mpeg",
        ("audio", ".ogg") => "audio/ogg",
        ("audio", ".wav") => "audio/wav",
        ("audio", ".m4a") => "audio/m4a",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_defaults_per_kind() {
        assert_eq!(extension_for("image", "photo").unwrap(), ".jpg");
        assert_eq!(extension_for("image", "photo.PNG").unwrap(), ".png");
        assert_eq!(extension_for("video", "clip").unwrap(), ".mp4");
        assert_eq!(extension_for("audio", "note.ogg").unwrap(), ".ogg");
        assert_eq!(extension_for("doc", "file.docx").unwrap(), ".docx");
    }

    #[test]
    fn stickers_forced_to_webp() {
        assert_eq!(extension_for("sticker", "anything.png").unwrap(), ".webp");
        assert_eq!(mimetype_for("sticker", ".webp"), "image/webp");
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(extension_for("archive", "x.zip").is_err());
    }

    #[test]
    fn mimetypes() {
        assert_eq!(mimetype_for("image", ".jpg"), "image/jpeg");
        assert_eq!(mimetype_for("audio", ".mp3"), "audio/mpeg");
        assert_eq!(mimetype_for("doc", ".pdf"), "application/octet-stream");
    }
}
