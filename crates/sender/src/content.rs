//! Message content bundles.

use serde::{Deserialize, Serialize};

use database::Template;

/// Everything one delivery can carry: an optional standalone text part plus
/// ordered URL lists per media kind, with per-kind captions where the
/// platform supports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub text_only: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub image_caption: String,
    #[serde(default)]
    pub video_urls: Vec<String>,
    #[serde(default)]
    pub video_caption: String,
    #[serde(default)]
    pub audio_urls: Vec<String>,
    #[serde(default)]
    pub sticker_urls: Vec<String>,
    #[serde(default)]
    pub doc_urls: Vec<String>,
    #[serde(default)]
    pub doc_caption: String,
}

impl MessageContent {
    pub fn from_template(template: &Template) -> Self {
        Self {
            text_only: template.text_only.clone(),
            image_urls: template.image_urls(),
            image_caption: template.images_caption.clone(),
            video_urls: template.video_urls(),
            video_caption: template.videos_caption.clone(),
            audio_urls: template.audio_urls(),
            sticker_urls: template.sticker_urls(),
            doc_urls: template.doc_urls(),
            doc_caption: template.docs_caption.clone(),
        }
    }

    /// Number of parts this content will produce.
    pub fn part_count(&self) -> usize {
        let text = usize::from(!self.text_only.trim().is_empty());
        text + self.image_urls.len()
            + self.video_urls.len()
            + self.audio_urls.len()
            + self.sticker_urls.len()
            + self.doc_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.part_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_count_skips_blank_text() {
        let mut content = MessageContent::default();
        assert!(content.is_empty());

        content.text_only = "   ".into();
        assert_eq!(content.part_count(), 0);

        content.text_only = "halo".into();
        content.image_urls = vec!["a".into(), "b".into()];
        content.doc_urls = vec!["c".into()];
        assert_eq!(content.part_count(), 4);
    }
}
