//! Ordered multi-part delivery to chat groups.
//!
//! Given (account, group, content), the [`Sender`] drives the fixed part
//! sequence text → images → videos → audios → stickers → documents, with a
//! human-cadence pause between parts, a bounded retry per part, and a risk
//! bump plus audit row on every final failure. One invocation's audit rows
//! share a campaign session id.
//!
//! # Example
//!
//! ```no_run
//! use sender::{MessageContent, Sender};
//!
//! # async fn example(sender: Sender) -> Result<(), sender::SendError> {
//! let content = MessageContent {
//!     text_only: "halo {group_name}, promo jam {time_now}!".into(),
//!     image_urls: vec!["/uploads/banner.jpg".into()],
//!     ..Default::default()
//! };
//! sender.send_to_group("account-1", "120@g.us", &content).await?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod content;
mod error;
mod fetch;
mod retry;

pub use clock::Zone;
pub use content::MessageContent;
pub use error::SendError;
pub use fetch::MediaFetcher;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use chat_core::{ChatClient, MediaKind, MediaRef, OutgoingMessage};
use database::log::NewLogEntry;
use database::{group, log, template, Database, LogStatus};
use session::SessionManager;

/// Preview column budget.
const PREVIEW_MAX_CHARS: usize = 128;

/// Inter-part pacing ranges in milliseconds, correlated with content size.
const PACE_TEXT: (u64, u64) = (1_000, 2_000);
const PACE_LIGHT: (u64, u64) = (1_200, 2_500);
const PACE_HEAVY: (u64, u64) = (1_500, 3_000);

/// Delivers content bundles to groups through an account's session.
pub struct Sender {
    db: Database,
    sessions: Arc<SessionManager>,
    fetcher: MediaFetcher,
    zone: Zone,
    risk_threshold: i64,
}

impl Sender {
    pub fn new(
        db: Database,
        sessions: Arc<SessionManager>,
        uploads_dir: impl Into<PathBuf>,
        zone: Zone,
        risk_threshold: i64,
    ) -> Result<Self, SendError> {
        Ok(Self {
            db,
            sessions,
            fetcher: MediaFetcher::new(uploads_dir)?,
            zone,
            risk_threshold,
        })
    }

    /// Deliver content to a group, generating a fresh campaign session id.
    pub async fn send_to_group(
        &self,
        account_id: &str,
        group_jid: &str,
        content: &MessageContent,
    ) -> Result<(), SendError> {
        self.send_to_group_with_session(account_id, group_jid, content, None)
            .await
    }

    /// Pick an enabled template uniformly at random and deliver it.
    pub async fn send_random_template(
        &self,
        account_id: &str,
        group_jid: &str,
    ) -> Result<(), SendError> {
        let template = template::pick_random_enabled(self.db.pool())
            .await?
            .ok_or(SendError::NoTemplate)?;
        let content = MessageContent::from_template(&template);
        let session_id = Uuid::new_v4().to_string();
        self.send_to_group_with_session(account_id, group_jid, &content, Some(&session_id))
            .await
    }

    /// Deliver content to a group, tagging all audit rows with the given
    /// session id (or a fresh one when none is supplied).
    ///
    /// On any part's final failure the group's risk score is bumped (pausing
    /// it at the threshold), the failure is recorded, and the remaining
    /// parts are not attempted.
    pub async fn send_to_group_with_session(
        &self,
        account_id: &str,
        group_jid: &str,
        content: &MessageContent,
        session_id: Option<&str>,
    ) -> Result<(), SendError> {
        let client = self.sessions.ensure_connected(account_id).await?;

        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let group_name = group::group_name(self.db.pool(), group_jid)
            .await?
            .unwrap_or_default();

        let started = std::time::Instant::now();
        info!(
            account = %account_id,
            group = %group_jid,
            session = %session_id,
            parts = content.part_count(),
            "delivery started"
        );

        // 1) Standalone text part
        if !content.text_only.trim().is_empty() {
            let text = self.personalize(&content.text_only, &group_name);
            let preview = format!("text-only:{text}");
            let (result, attempts) = retry::with_retry(|| {
                let client = client.clone();
                let text = text.clone();
                async move {
                    client
                        .send_message(group_jid, OutgoingMessage::Conversation { text })
                        .await
                        .map_err(SendError::from)
                }
            })
            .await;
            self.record(account_id, group_jid, &session_id, result, &preview, attempts)
                .await?;
            pace(PACE_TEXT).await;
        }

        // 2) Images
        for url in &content.image_urls {
            let caption = self.personalize_caption(&content.image_caption, &group_name);
            let (result, attempts) = retry::with_retry(|| {
                self.send_media(&client, group_jid, url, MediaKind::Image, caption.clone())
            })
            .await;
            let preview = media_preview("image", url, caption.as_deref());
            self.record(account_id, group_jid, &session_id, result, &preview, attempts)
                .await?;
            pace(PACE_LIGHT).await;
        }

        // 3) Videos
        for url in &content.video_urls {
            let caption = self.personalize_caption(&content.video_caption, &group_name);
            let (result, attempts) = retry::with_retry(|| {
                self.send_media(&client, group_jid, url, MediaKind::Video, caption.clone())
            })
            .await;
            let preview = media_preview("video", url, caption.as_deref());
            self.record(account_id, group_jid, &session_id, result, &preview, attempts)
                .await?;
            pace(PACE_HEAVY).await;
        }

        // 4) Audios (no caption support)
        for url in &content.audio_urls {
            let (result, attempts) = retry::with_retry(|| {
                self.send_media(&client, group_jid, url, MediaKind::Audio, None)
            })
            .await;
            let preview = media_preview("audio", url, None);
            self.record(account_id, group_jid, &session_id, result, &preview, attempts)
                .await?;
            pace(PACE_LIGHT).await;
        }

        // 5) Stickers (no caption support)
        for url in &content.sticker_urls {
            let (result, attempts) = retry::with_retry(|| {
                self.send_media(&client, group_jid, url, MediaKind::Sticker, None)
            })
            .await;
            let preview = media_preview("sticker", url, None);
            self.record(account_id, group_jid, &session_id, result, &preview, attempts)
                .await?;
            pace(PACE_LIGHT).await;
        }

        // 6) Documents
        for url in &content.doc_urls {
            let caption = self.personalize_caption(&content.doc_caption, &group_name);
            let (result, attempts) = retry::with_retry(|| {
                self.send_media(&client, group_jid, url, MediaKind::Document, caption.clone())
            })
            .await;
            let preview = media_preview("doc", url, caption.as_deref());
            self.record(account_id, group_jid, &session_id, result, &preview, attempts)
                .await?;
            pace(PACE_HEAVY).await;
        }

        group::mark_sent(self.db.pool(), group_jid).await?;
        info!(
            account = %account_id,
            group = %group_jid,
            session = %session_id,
            elapsed = ?started.elapsed(),
            "delivery complete"
        );
        Ok(())
    }

    /// Fetch, upload and send one media part.
    async fn send_media(
        &self,
        client: &Arc<dyn ChatClient>,
        jid: &str,
        url: &str,
        kind: MediaKind,
        caption: Option<String>,
    ) -> Result<(), SendError> {
        let (data, mimetype) = self.fetcher.fetch(url).await?;
        let file_length = data.len() as u64;
        let upload = client.upload(data, kind).await?;
        let media = MediaRef {
            upload,
            mimetype,
            file_length,
        };

        let message = match kind {
            MediaKind::Image => OutgoingMessage::Image { media, caption },
            MediaKind::Video => OutgoingMessage::Video { media, caption },
            MediaKind::Audio => OutgoingMessage::Audio { media },
            MediaKind::Sticker => OutgoingMessage::Sticker { media },
            MediaKind::Document => OutgoingMessage::Document {
                media,
                file_name: fetch::file_name_from_url(url),
                caption,
            },
        };

        client.send_message(jid, message).await?;
        Ok(())
    }

    /// Write the audit row for one part; on failure also bump the group's
    /// risk score (auto-pausing at the threshold) and propagate the error so
    /// the remaining parts are skipped.
    async fn record(
        &self,
        account_id: &str,
        group_jid: &str,
        session_id: &str,
        result: Result<(), SendError>,
        preview: &str,
        attempts: i64,
    ) -> Result<(), SendError> {
        match result {
            Ok(()) => {
                log::append_log(
                    self.db.pool(),
                    &NewLogEntry {
                        account_id,
                        group_id: group_jid,
                        campaign_id: None,
                        session_id: Some(session_id),
                        status: LogStatus::Sent,
                        error: "",
                        preview: &short(preview),
                        attempt: attempts,
                    },
                )
                .await?;
                Ok(())
            }
            Err(err) => {
                warn!(
                    account = %account_id,
                    group = %group_jid,
                    session = %session_id,
                    attempts,
                    error = %err,
                    "part delivery failed"
                );
                log::append_log(
                    self.db.pool(),
                    &NewLogEntry {
                        account_id,
                        group_id: group_jid,
                        campaign_id: None,
                        session_id: Some(session_id),
                        status: LogStatus::Failed,
                        error: &err.to_string(),
                        preview: &short(preview),
                        attempt: attempts,
                    },
                )
                .await?;
                group::bump_risk_and_maybe_pause(self.db.pool(), group_jid, self.risk_threshold)
                    .await?;
                Err(err)
            }
        }
    }

    /// Substitute the supported placeholders. Additions go through this one
    /// table.
    fn personalize(&self, text: &str, group_name: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let substitutions = [
            ("{group_name}", group_name.to_string()),
            ("{time_now}", self.zone.now_hhmm()),
        ];
        let mut out = text.to_string();
        for (placeholder, value) in &substitutions {
            out = out.replace(placeholder, value);
        }
        out
    }

    fn personalize_caption(&self, caption: &str, group_name: &str) -> Option<String> {
        if caption.trim().is_empty() {
            None
        } else {
            Some(self.personalize(caption, group_name))
        }
    }
}

fn media_preview(kind: &str, url: &str, caption: Option<&str>) -> String {
    match caption {
        Some(caption) => format!("{kind}:{url} (caption:{caption})"),
        None => format!("{kind}:{url}"),
    }
}

fn short(s: &str) -> String {
    s.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Uniform random pause between parts.
async fn pace((min_ms, max_ms): (u64, u64)) {
    let wait = {
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    };
    tokio::time::sleep(wait).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::ProtoError;
    use database::account;
    use mock_chat::{MockClient, MockPlatform};
    use session::store_dsn;

    const BASE: &str = "sqlite:test.db?mode=rwc";

    struct Fixture {
        db: Database,
        sender: Sender,
        mock: Arc<MockClient>,
        account_id: String,
    }

    async fn fixture(uploads_dir: &std::path::Path) -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        let platform = MockPlatform::new();
        let sessions = SessionManager::new(db.clone(), platform.clone(), BASE.to_string());

        let account_id = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &account_id, "120@g.us", "Toko")
            .await
            .unwrap();
        group::toggle_group(db.pool(), "120@g.us", true).await.unwrap();

        let mock = platform.client_for(&store_dsn::per_account_dsn(BASE, &account_id));
        mock.set_paired(true);

        let sender = Sender::new(db.clone(), sessions, uploads_dir, Zone::default(), 3).unwrap();
        Fixture {
            db,
            sender,
            mock,
            account_id,
        }
    }

    fn seed_uploads(dir: &std::path::Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"media-bytes").unwrap();
        }
    }

    fn kind_of(message: &OutgoingMessage) -> &'static str {
        match message {
            OutgoingMessage::Conversation { .. } => "text",
            OutgoingMessage::Image { .. } => "image",
            OutgoingMessage::Video { .. } => "video",
            OutgoingMessage::Audio { .. } => "audio",
            OutgoingMessage::Sticker { .. } => "sticker",
            OutgoingMessage::Document { .. } => "doc",
        }
    }

    #[tokio::test]
    async fn test_part_order_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        seed_uploads(
            dir.path(),
            &["a.jpg", "b.jpg", "v.mp4", "s.mp3", "st.webp", "d.pdf"],
        );
        let f = fixture(dir.path()).await;

        let content = MessageContent {
            text_only: "halo".into(),
            image_urls: vec!["/uploads/a.jpg".into(), "/uploads/b.jpg".into()],
            video_urls: vec!["/uploads/v.mp4".into()],
            audio_urls: vec!["/uploads/s.mp3".into()],
            sticker_urls: vec!["/uploads/st.webp".into()],
            doc_urls: vec!["/uploads/d.pdf".into()],
            ..Default::default()
        };
        f.sender
            .send_to_group(&f.account_id, "120@g.us", &content)
            .await
            .unwrap();

        let kinds: Vec<_> = f.mock.sent().iter().map(|(_, m)| kind_of(m)).collect();
        assert_eq!(
            kinds,
            vec!["text", "image", "image", "video", "audio", "sticker", "doc"]
        );

        // All parts succeeded: cooldown stamp set
        let groups = group::list_groups(f.db.pool(), None).await.unwrap();
        assert!(groups[0].last_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_placeholders_substituted_into_preview() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;

        let content = MessageContent {
            text_only: "halo {group_name}".into(),
            ..Default::default()
        };
        f.sender
            .send_to_group(&f.account_id, "120@g.us", &content)
            .await
            .unwrap();

        let sent = f.mock.sent();
        match &sent[0].1 {
            OutgoingMessage::Conversation { text } => assert_eq!(text, "halo Toko"),
            other => panic!("unexpected message: {other:?}"),
        }

        let rows = log::logs_after(f.db.pool(), 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "sent");
        assert!(rows[0].message_preview.starts_with("text-only:halo Toko"));
        assert_eq!(rows[0].attempt, 1);
    }

    #[tokio::test]
    async fn test_time_now_placeholder_shape() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;

        let content = MessageContent {
            text_only: "jam {time_now}".into(),
            ..Default::default()
        };
        f.sender
            .send_to_group(&f.account_id, "120@g.us", &content)
            .await
            .unwrap();

        match &f.mock.sent()[0].1 {
            OutgoingMessage::Conversation { text } => {
                let time = text.strip_prefix("jam ").unwrap();
                assert_eq!(time.len(), 5);
                assert_eq!(time.as_bytes()[2], b':');
                assert!(time[..2].parse::<u8>().unwrap() < 24);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_retried_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;

        f.mock
            .push_send_error(ProtoError::SendFailed("timeout".into()));
        f.mock
            .push_send_error(ProtoError::SendFailed("stream reset".into()));

        let content = MessageContent {
            text_only: "halo".into(),
            ..Default::default()
        };
        f.sender
            .send_to_group(&f.account_id, "120@g.us", &content)
            .await
            .unwrap();

        assert_eq!(f.mock.sent().len(), 1);
        let rows = log::logs_after(f.db.pool(), 0, 10).await.unwrap();
        assert_eq!(rows[0].status, "sent");
        assert_eq!(rows[0].attempt, 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_bumps_risk_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        seed_uploads(dir.path(), &["a.jpg"]);
        let f = fixture(dir.path()).await;

        f.mock
            .push_send_error(ProtoError::SendFailed("not authorized".into()));

        let content = MessageContent {
            text_only: "halo".into(),
            image_urls: vec!["/uploads/a.jpg".into()],
            ..Default::default()
        };
        let err = f
            .sender
            .send_to_group(&f.account_id, "120@g.us", &content)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Proto(_)));

        // Terminal error: single attempt, failed row, risk bumped, image
        // part never attempted, no cooldown stamp.
        let rows = log::logs_after(f.db.pool(), 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "failed");
        assert_eq!(rows[0].attempt, 1);
        assert!(f.mock.uploads().is_empty());

        let g = &group::list_groups(f.db.pool(), None).await.unwrap()[0];
        assert_eq!(g.risk_score, 1);
        assert!(g.enabled);
        assert!(g.last_sent_at.is_none());
    }

    #[tokio::test]
    async fn test_risk_escalation_pauses_group() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;

        let content = MessageContent {
            text_only: "halo".into(),
            ..Default::default()
        };
        for _ in 0..3 {
            f.mock
                .push_send_error(ProtoError::SendFailed("blocked by policy".into()));
            let _ = f
                .sender
                .send_to_group(&f.account_id, "120@g.us", &content)
                .await;
        }

        let g = &group::list_groups(f.db.pool(), None).await.unwrap()[0];
        assert_eq!(g.risk_score, 3);
        assert!(!g.enabled);
    }

    #[tokio::test]
    async fn test_session_id_groups_rows() {
        let dir = tempfile::tempdir().unwrap();
        seed_uploads(dir.path(), &["a.jpg"]);
        let f = fixture(dir.path()).await;

        let content = MessageContent {
            text_only: "halo".into(),
            image_urls: vec!["/uploads/a.jpg".into()],
            image_caption: "promo {group_name}".into(),
            ..Default::default()
        };
        f.sender
            .send_to_group_with_session(&f.account_id, "120@g.us", &content, Some("campaign-7"))
            .await
            .unwrap();

        let rows = log::logs_after(f.db.pool(), 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|row| row.campaign_session_id == "campaign-7"));
        assert!(rows[1]
            .message_preview
            .contains("(caption:promo Toko)"));
    }

    #[tokio::test]
    async fn test_not_paired_fails_before_any_part() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;
        f.mock.set_paired(false);

        let content = MessageContent {
            text_only: "halo".into(),
            ..Default::default()
        };
        let err = f
            .sender
            .send_to_group(&f.account_id, "120@g.us", &content)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Session(_)));
        assert!(log::logs_after(f.db.pool(), 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_random_template_requires_enabled_template() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;

        let err = f
            .sender
            .send_random_template(&f.account_id, "120@g.us")
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::NoTemplate));
    }

    #[tokio::test]
    async fn test_random_template_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path()).await;

        template::create_template(
            f.db.pool(),
            &template::NewTemplate {
                name: "Promo".into(),
                text_only: "halo {group_name}".into(),
                enabled: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        f.sender
            .send_random_template(&f.account_id, "120@g.us")
            .await
            .unwrap();

        let rows = log::logs_after(f.db.pool(), 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].campaign_session_id.is_empty());
    }

    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(500);
        assert_eq!(short(&long).chars().count(), 128);
        assert_eq!(short("abc"), "abc");
    }
}
