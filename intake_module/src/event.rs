//! Platform-neutral view of one inbound chat message.

use std::fmt;

/// Kind of conversation a message arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    User,
    Group,
    Room,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::User => "user",
            SourceKind::Group => "group",
            SourceKind::Room => "room",
        };
        f.write_str(label)
    }
}

/// Who sent a message and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub kind: SourceKind,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub room_id: Option<String>,
}

impl EventSource {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::User,
            user_id: Some(user_id.into()),
            group_id: None,
            room_id: None,
        }
    }

    pub fn group(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Group,
            user_id: Some(user_id.into()),
            group_id: Some(group_id.into()),
            room_id: None,
        }
    }

    pub fn room(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Room,
            user_id: Some(user_id.into()),
            group_id: None,
            room_id: Some(room_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// Anything that is not a text message: images, stickers, follow events...
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub source: EventSource,
    pub content: MessageContent,
}

impl ChatEvent {
    pub fn text(source: EventSource, text: impl Into<String>) -> Self {
        Self {
            source,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn text_body(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Other(_) => None,
        }
    }
}
