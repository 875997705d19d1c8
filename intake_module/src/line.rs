//! LINE Messaging API adapter.
//!
//! - Webhook payload types and their conversion into [`ChatEvent`]s
//! - `X-Line-Signature` verification
//! - [`LineProfileClient`]: display-name lookup for a message source

use std::time::Duration;

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::event::{ChatEvent, EventSource, MessageContent, SourceKind};

pub const DEFAULT_LINE_API_BASE_URL: &str = "https://api.line.me";

pub const SIGNATURE_HEADER: &str = "x-line-signature";

const LINE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("source has no user id")]
    MissingUserId,
    #[error("{kind} source is missing its {kind} id")]
    MissingConversationId { kind: SourceKind },
    #[error("http error: {0}")]
    Http(String),
    #[error("LINE API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse profile: {0}")]
    Decode(String),
}

// ============================================================================
// Webhook payload
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LineWebhook {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<LineMessage>,
    #[serde(default)]
    pub source: Option<LineSource>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub reply_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl LineSource {
    fn to_event_source(&self) -> EventSource {
        let kind = match self.kind.as_str() {
            "group" => SourceKind::Group,
            "room" => SourceKind::Room,
            _ => SourceKind::User,
        };
        EventSource {
            kind,
            user_id: self.user_id.clone(),
            group_id: self.group_id.clone(),
            room_id: self.room_id.clone(),
        }
    }
}

impl LineEvent {
    /// Convert to a [`ChatEvent`]. Anything but a text message becomes
    /// [`MessageContent::Other`].
    pub fn to_chat_event(&self) -> ChatEvent {
        let source = self
            .source
            .as_ref()
            .map(LineSource::to_event_source)
            .unwrap_or(EventSource {
                kind: SourceKind::User,
                user_id: None,
                group_id: None,
                room_id: None,
            });

        let content = match (&self.message, self.kind.as_str()) {
            (Some(message), "message") if message.kind == "text" => {
                MessageContent::Text(message.text.clone().unwrap_or_default())
            }
            (Some(message), "message") => MessageContent::Other(message.kind.clone()),
            _ => MessageContent::Other(self.kind.clone()),
        };

        ChatEvent { source, content }
    }
}

impl LineWebhook {
    pub fn parse(raw_payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw_payload)
    }

    pub fn chat_events(&self) -> Vec<ChatEvent> {
        self.events.iter().map(LineEvent::to_chat_event).collect()
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Check `X-Line-Signature`: base64 of HMAC-SHA256(channel secret, body).
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature LINE would send for `body`.
pub fn sign_body(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

// ============================================================================
// Profile lookup
// ============================================================================

/// Resolves a message source to the sender's chat display name.
pub trait IdentityLookup: Send + Sync {
    fn display_name(&self, source: &EventSource) -> Result<String, LineError>;
}

#[derive(Debug, Clone)]
pub struct LineProfileClient {
    access_token: String,
    api_base: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineProfile {
    display_name: String,
}

impl LineProfileClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_LINE_API_BASE_URL)
    }

    pub fn with_base_url(access_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(LINE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            access_token: access_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Profile endpoint for the sender of a message from `source`.
    pub fn profile_url(&self, source: &EventSource) -> Result<String, LineError> {
        let user_id = source.user_id.as_deref().ok_or(LineError::MissingUserId)?;
        let user_id = urlencoding::encode(user_id);
        let missing = || LineError::MissingConversationId { kind: source.kind };
        let path = match source.kind {
            SourceKind::User => format!("/v2/bot/profile/{}", user_id),
            SourceKind::Group => {
                let group_id = source.group_id.as_deref().ok_or_else(missing)?;
                format!(
                    "/v2/bot/group/{}/member/{}",
                    urlencoding::encode(group_id),
                    user_id
                )
            }
            SourceKind::Room => {
                let room_id = source.room_id.as_deref().ok_or_else(missing)?;
                format!(
                    "/v2/bot/room/{}/member/{}",
                    urlencoding::encode(room_id),
                    user_id
                )
            }
        };
        Ok(format!("{}{}", self.api_base, path))
    }
}

impl IdentityLookup for LineProfileClient {
    fn display_name(&self, source: &EventSource) -> Result<String, LineError> {
        let url = self.profile_url(source)?;
        debug!("LINE profile lookup for {} source", source.kind);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| LineError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(LineError::Api { status, body });
        }

        let profile: LineProfile = response
            .json()
            .map_err(|e| LineError::Decode(e.to_string()))?;
        Ok(profile.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBHOOK: &str = r#"{
        "destination": "U0bot",
        "events": [
            {"type": "message", "replyToken": "r1", "timestamp": 1700000000000,
             "source": {"type": "group", "groupId": "Cgroup", "userId": "Ualice"},
             "message": {"type": "text", "id": "m1", "text": "CX-9 2WD-R"}},
            {"type": "message",
             "source": {"type": "user", "userId": "Ubob"},
             "message": {"type": "sticker", "id": "m2", "packageId": "1", "stickerId": "2"}},
            {"type": "follow", "source": {"type": "user", "userId": "Ucarol"}}
        ]
    }"#;

    #[test]
    fn webhook_events_convert_to_chat_events() {
        let webhook = LineWebhook::parse(WEBHOOK.as_bytes()).expect("parse");
        let events = webhook.chat_events();
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].source, EventSource::group("Cgroup", "Ualice"));
        assert_eq!(events[0].text_body(), Some("CX-9 2WD-R"));

        assert_eq!(events[1].content, MessageContent::Other("sticker".to_string()));
        assert_eq!(events[2].content, MessageContent::Other("follow".to_string()));
        assert_eq!(events[2].source, EventSource::user("Ucarol"));
    }

    #[test]
    fn empty_events_payload_is_valid() {
        let webhook = LineWebhook::parse(br#"{"destination":"U0bot","events":[]}"#).expect("parse");
        assert!(webhook.chat_events().is_empty());
    }

    #[test]
    fn signature_round_trip_and_tamper() {
        let body = br#"{"events":[]}"#;
        let signature = sign_body("secret", body);
        assert!(verify_signature("secret", body, &signature));
        assert!(!verify_signature("other-secret", body, &signature));
        assert!(!verify_signature("secret", br#"{"events":[1]}"#, &signature));
        assert!(!verify_signature("secret", body, "%%%not-base64"));
    }

    #[test]
    fn profile_urls_follow_source_kind() {
        let client = LineProfileClient::with_base_url("token", "https://line.test/");
        assert_eq!(
            client.profile_url(&EventSource::user("U1")).expect("user"),
            "https://line.test/v2/bot/profile/U1"
        );
        assert_eq!(
            client.profile_url(&EventSource::group("C1", "U1")).expect("group"),
            "https://line.test/v2/bot/group/C1/member/U1"
        );
        assert_eq!(
            client.profile_url(&EventSource::room("R1", "U1")).expect("room"),
            "https://line.test/v2/bot/room/R1/member/U1"
        );

        let mut orphan = EventSource::group("C1", "U1");
        orphan.group_id = None;
        assert!(matches!(
            client.profile_url(&orphan),
            Err(LineError::MissingConversationId { kind: SourceKind::Group })
        ));
        orphan.user_id = None;
        assert!(matches!(client.profile_url(&orphan), Err(LineError::MissingUserId)));
    }
}
