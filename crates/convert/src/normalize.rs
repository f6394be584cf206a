use std::{path::Path, sync::Arc};

use {
    serde::Deserialize,
    tracing::{debug, warn},
};

use onebridge_media::MediaCache;

use crate::{
    error::{ConvertError, Result},
    event::{InboundEvent, MessageKind, OutboundEvent, Scope, SenderProfile},
    ident, markup,
};

const IMAGE_PLACEHOLDER: &str = "[image message]";
const VOICE_PLACEHOLDER: &str = "[voice message]";
const VIDEO_PLACEHOLDER: &str = "[video message]";
const LOCATION_PLACEHOLDER: &str = "[location message]";

/// Turns inbound relay events into outbound target-protocol events.
///
/// Holds the bridge's own derived identity (0 until startup has resolved
/// it) and the media cache; both are injected at construction.
pub struct Normalizer {
    self_id: i64,
    media: Arc<MediaCache>,
}

impl Normalizer {
    pub fn new(self_id: i64, media: Arc<MediaCache>) -> Self {
        Self { self_id, media }
    }

    /// Convert one inbound event into exactly one outbound event.
    ///
    /// Media download failures degrade to kind-specific placeholders and
    /// never fail the conversion; only structurally invalid input errors.
    pub async fn normalize(&self, mut event: InboundEvent) -> Result<OutboundEvent> {
        if !event.markup.is_empty() {
            event.mentioned = markup::extract_mentions(&event.markup);
        }

        let rendered_text = self.render(&event).await;
        let actor_id = ident::derive(&event.sender);

        let (scope, group_id) = if event.is_group {
            let conversation = event
                .conversation
                .as_deref()
                .filter(|conversation| !conversation.is_empty())
                .ok_or(ConvertError::MissingConversation)?;
            (Scope::Group, Some(ident::derive(conversation)))
        } else {
            (Scope::Direct, None)
        };

        debug!(kind = ?event.kind(), actor_id, ?scope, "normalized inbound event");

        Ok(OutboundEvent {
            post_type: "message".into(),
            time: chrono::Utc::now().timestamp(),
            self_id: self.self_id,
            scope,
            sub_type: "normal".into(),
            sequence_id: next_sequence_id(),
            actor_id,
            rendered_text,
            raw_text: event.text,
            font: 0,
            sender: SenderProfile {
                user_id: actor_id,
                nickname: event.sender.clone(),
                card: event.sender,
            },
            group_id,
        })
    }

    async fn render(&self, event: &InboundEvent) -> String {
        match event.kind() {
            MessageKind::Text => self.render_text(event),
            MessageKind::Image => self.render_media(event, "image", IMAGE_PLACEHOLDER).await,
            MessageKind::Voice => self.render_media(event, "record", VOICE_PLACEHOLDER).await,
            MessageKind::Video => self.render_media(event, "video", VIDEO_PLACEHOLDER).await,
            MessageKind::File => self.render_file(event).await,
            MessageKind::Emoji => format!("[CQ:face,id={}]", event.text),
            MessageKind::Location => render_location(&event.text),
            MessageKind::App => render_app(&event.markup),
            MessageKind::System => format!("[system] {}", event.text),
            MessageKind::Unknown(code) => {
                format!("[unsupported message type {code}] {}", event.text)
            },
        }
    }

    /// Plain text, with every mentioned identity rewritten into an inline
    /// mention tag.
    fn render_text(&self, event: &InboundEvent) -> String {
        let mut text = event.text.clone();
        for mention in &event.mentioned {
            let tag = format!("[CQ:at,qq={}]", ident::derive(mention));
            text = text.replace(&format!("@{mention}"), &tag);
        }
        text
    }

    async fn render_media(&self, event: &InboundEvent, tag: &str, placeholder: &str) -> String {
        let Some(url) = event.attachment_url.as_deref() else {
            return placeholder.to_string();
        };
        match self.media.fetch(url, None).await {
            Ok(path) => format!("[CQ:{tag},file={}]", file_uri(&path)),
            Err(e) => {
                warn!(url, error = %e, "media fetch failed, substituting placeholder");
                placeholder.to_string()
            },
        }
    }

    async fn render_file(&self, event: &InboundEvent) -> String {
        let name = event.attachment_name.as_deref();
        let Some(url) = event.attachment_url.as_deref() else {
            return file_placeholder(name);
        };
        match self.media.fetch(url, name).await {
            Ok(path) => format!(
                "[CQ:file,file={},name={}]",
                file_uri(&path),
                name.unwrap_or("file")
            ),
            Err(e) => {
                warn!(url, error = %e, "file fetch failed, substituting placeholder");
                file_placeholder(name)
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LocationPayload {
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    title: String,
}

fn render_location(text: &str) -> String {
    match serde_json::from_str::<LocationPayload>(text) {
        Ok(location) => format!(
            "[CQ:location,lat={},lon={},title={}]",
            location.lat, location.lon, location.title
        ),
        Err(e) => {
            debug!(error = %e, "unparseable location payload");
            LOCATION_PLACEHOLDER.to_string()
        },
    }
}

/// App/link cards always render all three fields; absent ones stay empty.
fn render_app(markup: &str) -> String {
    let info = markup::extract_link_info(markup);
    format!(
        "[CQ:share,url={},title={},content={}]",
        info.url, info.title, info.description
    )
}

fn file_placeholder(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => format!("[file message: {name}]"),
        _ => "[file message]".to_string(),
    }
}

fn file_uri(path: &Path) -> String {
    if path.is_absolute() {
        format!("file://{}", path.display())
    } else {
        format!("file:///{}", path.display())
    }
}

/// Process-local, time-derived event id.
///
/// Collides only when the clock does not advance between calls, a known
/// weak-uniqueness property inherited from the source scheme.
fn next_sequence_id() -> i64 {
    chrono::Utc::now().timestamp_millis() % (1 << 31)
}
