//! Template operations.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{to_json_list, Template};

/// Input for creating or updating a template.
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub name: String,
    pub text_only: String,
    pub image_urls: Vec<String>,
    pub images_caption: String,
    pub video_urls: Vec<String>,
    pub videos_caption: String,
    pub audio_urls: Vec<String>,
    pub sticker_urls: Vec<String>,
    pub doc_urls: Vec<String>,
    pub docs_caption: String,
    pub enabled: bool,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, text_only,
           images_json, images_caption,
           videos_json, videos_caption,
           audio_json, stickers_json,
           docs_json, docs_caption,
           enabled, created_at, updated_at
    FROM templates
"#;

/// Create a template and return its generated id.
pub async fn create_template(pool: &SqlitePool, t: &NewTemplate) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO templates
            (id, name, text_only,
             images_json, images_caption,
             videos_json, videos_caption,
             audio_json, stickers_json,
             docs_json, docs_caption,
             enabled)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&t.name)
    .bind(&t.text_only)
    .bind(to_json_list(&t.image_urls))
    .bind(&t.images_caption)
    .bind(to_json_list(&t.video_urls))
    .bind(&t.videos_caption)
    .bind(to_json_list(&t.audio_urls))
    .bind(to_json_list(&t.sticker_urls))
    .bind(to_json_list(&t.doc_urls))
    .bind(&t.docs_caption)
    .bind(t.enabled)
    .execute(pool)
    .await?;

    Ok(id)
}

/// List all templates, newest first.
pub async fn list_templates(pool: &SqlitePool) -> Result<Vec<Template>> {
    let templates =
        sqlx::query_as::<_, Template>(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC"))
            .fetch_all(pool)
            .await?;
    Ok(templates)
}

/// Full update of a template. Returns rows affected.
pub async fn update_template(pool: &SqlitePool, id: &str, t: &NewTemplate) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE templates
        SET name = ?, text_only = ?,
            images_json = ?, images_caption = ?,
            videos_json = ?, videos_caption = ?,
            audio_json = ?, stickers_json = ?,
            docs_json = ?, docs_caption = ?,
            enabled = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&t.name)
    .bind(&t.text_only)
    .bind(to_json_list(&t.image_urls))
    .bind(&t.images_caption)
    .bind(to_json_list(&t.video_urls))
    .bind(&t.videos_caption)
    .bind(to_json_list(&t.audio_urls))
    .bind(to_json_list(&t.sticker_urls))
    .bind(to_json_list(&t.doc_urls))
    .bind(&t.docs_caption)
    .bind(t.enabled)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a template. Returns rows affected.
pub async fn delete_template(pool: &SqlitePool, id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM templates WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Enable or disable a template. Returns rows affected.
pub async fn toggle_template(pool: &SqlitePool, id: &str, enabled: bool) -> Result<u64> {
    let result =
        sqlx::query("UPDATE templates SET enabled = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Pick one enabled template uniformly at random.
pub async fn pick_random_enabled(pool: &SqlitePool) -> Result<Option<Template>> {
    let template = sqlx::query_as::<_, Template>(&format!(
        "{SELECT_COLUMNS} WHERE enabled = 1 ORDER BY RANDOM() LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(template)
}
