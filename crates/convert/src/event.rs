use serde::{Deserialize, Serialize};

use crate::error::Result;

// ── Inbound (source protocol) ───────────────────────────────────────────────

/// Message-kind codes used by the source relay.
pub mod codes {
    pub const TEXT: u32 = 1;
    pub const IMAGE: u32 = 3;
    pub const VOICE: u32 = 34;
    pub const VIDEO: u32 = 43;
    pub const EMOJI: u32 = 47;
    pub const LOCATION: u32 = 48;
    /// Shared by file transfers and app/link cards; see
    /// [`super::InboundEvent::kind`].
    pub const FILE_OR_APP: u32 = 49;
    pub const SYSTEM: u32 = 10000;
}

/// Resolved message kind of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    File,
    Emoji,
    Location,
    App,
    System,
    Unknown(u32),
}

/// One source-protocol message, as delivered by the relay's webhook or
/// WebSocket feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Raw message-kind code (`type` on the wire).
    #[serde(rename = "type")]
    pub kind_code: u32,

    /// Textual payload; its meaning depends on the kind (plain text,
    /// emoji id, location JSON, ...).
    #[serde(rename = "content", default)]
    pub text: String,

    /// Embedded structured markup (`xml` on the wire), may be empty.
    #[serde(rename = "xml", default)]
    pub markup: String,

    /// Opaque string identity of the sender.
    #[serde(default)]
    pub sender: String,

    /// Group conversation id (`roomid` on the wire); present iff the event
    /// originated in a group.
    #[serde(rename = "roomid", default)]
    pub conversation: Option<String>,

    #[serde(default)]
    pub is_group: bool,

    /// Mentioned identities, populated from `markup` during normalization.
    #[serde(skip)]
    pub mentioned: Vec<String>,

    /// Remote locator for a binary payload, for kinds that carry one.
    #[serde(rename = "file_url", default)]
    pub attachment_url: Option<String>,

    /// Suggested file name for the binary payload.
    #[serde(rename = "file_name", default)]
    pub attachment_name: Option<String>,

    /// Byte count reported by the relay; informational only.
    #[serde(rename = "file_size", default)]
    pub attachment_size: Option<u64>,
}

impl InboundEvent {
    /// Decode a wire envelope.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode an already-parsed wire envelope.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Resolve the raw kind code.
    ///
    /// Code 49 is shared by file transfers and app/link cards on the wire;
    /// an attachment URL marks the former.
    pub fn kind(&self) -> MessageKind {
        match self.kind_code {
            codes::TEXT => MessageKind::Text,
            codes::IMAGE => MessageKind::Image,
            codes::VOICE => MessageKind::Voice,
            codes::VIDEO => MessageKind::Video,
            codes::EMOJI => MessageKind::Emoji,
            codes::LOCATION => MessageKind::Location,
            codes::FILE_OR_APP if self.attachment_url.is_some() => MessageKind::File,
            codes::FILE_OR_APP => MessageKind::App,
            codes::SYSTEM => MessageKind::System,
            other => MessageKind::Unknown(other),
        }
    }
}

// ── Outbound (target protocol) ──────────────────────────────────────────────

/// Conversation scope of an outbound event.
///
/// `Direct` serializes as `"private"`, the target protocol's wire name for
/// one-to-one messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[serde(rename = "private")]
    Direct,
    Group,
}

/// The `sender` block of a target-protocol message event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub user_id: i64,
    pub nickname: String,
    /// Group display name; mirrors `nickname` since the relay does not
    /// deliver per-group cards.
    pub card: String,
}

/// One target-protocol message event, produced exactly once per
/// successfully normalized [`InboundEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub post_type: String,

    /// Capture time, seconds since epoch.
    pub time: i64,

    /// The bridge's own derived identity; 0 means not yet initialized.
    pub self_id: i64,

    #[serde(rename = "message_type")]
    pub scope: Scope,

    pub sub_type: String,

    /// Time-derived, process-local id. Collides only when the clock does
    /// not advance between events.
    #[serde(rename = "message_id")]
    pub sequence_id: i64,

    /// Integer identity derived from the sender string.
    #[serde(rename = "user_id")]
    pub actor_id: i64,

    /// Final display string, may embed inline CQ tags.
    #[serde(rename = "message")]
    pub rendered_text: String,

    /// Original inbound text, unmodified, for audit.
    #[serde(rename = "raw_message")]
    pub raw_text: String,

    pub font: i64,

    pub sender: SenderProfile,

    /// Integer identity derived from the conversation id; present iff the
    /// scope is group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn event(kind_code: u32) -> InboundEvent {
        InboundEvent {
            kind_code,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(codes::TEXT, MessageKind::Text)]
    #[case(codes::IMAGE, MessageKind::Image)]
    #[case(codes::VOICE, MessageKind::Voice)]
    #[case(codes::VIDEO, MessageKind::Video)]
    #[case(codes::EMOJI, MessageKind::Emoji)]
    #[case(codes::LOCATION, MessageKind::Location)]
    #[case(codes::SYSTEM, MessageKind::System)]
    #[case(777, MessageKind::Unknown(777))]
    fn kind_codes_resolve(#[case] code: u32, #[case] expected: MessageKind) {
        assert_eq!(event(code).kind(), expected);
    }

    #[test]
    fn shared_code_splits_on_attachment() {
        let mut e = event(49);
        assert_eq!(e.kind(), MessageKind::App);
        e.attachment_url = Some("http://x/doc.pdf".into());
        assert_eq!(e.kind(), MessageKind::File);
    }

    #[test]
    fn decodes_wire_envelope() {
        let raw = r#"{
            "type": 1,
            "content": "hello",
            "xml": "",
            "sender": "wxid_alice",
            "roomid": "123@chatroom",
            "is_group": true,
            "file_url": null
        }"#;
        let e = InboundEvent::from_json_str(raw).unwrap();
        assert_eq!(e.kind(), MessageKind::Text);
        assert_eq!(e.text, "hello");
        assert_eq!(e.sender, "wxid_alice");
        assert_eq!(e.conversation.as_deref(), Some("123@chatroom"));
        assert!(e.is_group);
        assert!(e.mentioned.is_empty());
    }

    #[test]
    fn missing_kind_is_an_envelope_error() {
        assert!(InboundEvent::from_json_str(r#"{"content": "hi"}"#).is_err());
        assert!(InboundEvent::from_json_str("not json").is_err());
    }

    #[test]
    fn outbound_wire_shape() {
        let out = OutboundEvent {
            post_type: "message".into(),
            time: 1700000000,
            self_id: 42,
            scope: Scope::Group,
            sub_type: "normal".into(),
            sequence_id: 7,
            actor_id: 11,
            rendered_text: "hi".into(),
            raw_text: "hi".into(),
            font: 0,
            sender: SenderProfile {
                user_id: 11,
                nickname: "wxid_bob".into(),
                card: "wxid_bob".into(),
            },
            group_id: Some(99),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["post_type"], "message");
        assert_eq!(value["message_type"], "group");
        assert_eq!(value["message_id"], 7);
        assert_eq!(value["user_id"], 11);
        assert_eq!(value["message"], "hi");
        assert_eq!(value["raw_message"], "hi");
        assert_eq!(value["group_id"], 99);
        assert_eq!(value["sender"]["nickname"], "wxid_bob");
    }

    #[test]
    fn direct_scope_serializes_as_private_and_omits_group_id() {
        let out = OutboundEvent {
            post_type: "message".into(),
            time: 0,
            self_id: 0,
            scope: Scope::Direct,
            sub_type: "normal".into(),
            sequence_id: 0,
            actor_id: 0,
            rendered_text: String::new(),
            raw_text: String::new(),
            font: 0,
            sender: SenderProfile {
                user_id: 0,
                nickname: String::new(),
                card: String::new(),
            },
            group_id: None,
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["message_type"], "private");
        assert!(value.get("group_id").is_none());
    }
}
