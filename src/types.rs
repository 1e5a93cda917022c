use crate::snowflake::{DecimalU64Visitor, Snowflake};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Tri-state optional field for modify requests.
///
/// `Unset` is omitted from the body, `Null` is sent as JSON `null` to clear
/// the field on the server, `Value` sends the value. Annotate fields with
/// `#[serde(default, skip_serializing_if = "Nullable::is_unset")]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nullable<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> Nullable<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Nullable::Unset)
    }
}

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Nullable::Unset
    }
}

impl<T> From<T> for Nullable<T> {
    fn from(value: T) -> Self {
        Nullable::Value(value)
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Nullable::Value(v) => v.serialize(serializer),
            Nullable::Unset | Nullable::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<T>::deserialize(deserializer)?.map_or(Nullable::Null, Nullable::Value))
    }
}

/// Permission bitset, transmitted as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const VIEW_CHANNEL: Permissions = Permissions(1 << 10);
    pub const SEND_MESSAGES: Permissions = Permissions(1 << 11);
    pub const MANAGE_MESSAGES: Permissions = Permissions(1 << 13);
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 3);

    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self {
        Permissions(self.0 | rhs.0)
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalU64Visitor).map(Permissions)
    }
}

/// Image payload sent as a `data:` URI (guild icons, webhook avatars).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData(String);

impl ImageData {
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{};base64,{}", mime, encoded))
    }

    /// Sniff PNG/JPEG/GIF/WebP from the magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        let mime = if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            "image/png"
        } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
            "image/jpeg"
        } else if bytes.starts_with(b"GIF8") {
            "image/gif"
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            "image/webp"
        } else {
            return None;
        };
        Some(Self::from_bytes(mime, bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ImageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub afk_channel_id: Option<Snowflake>,
    #[serde(default)]
    pub afk_timeout: Option<u32>,
    #[serde(default)]
    pub system_channel_id: Option<Snowflake>,
    #[serde(default)]
    pub verification_level: Option<u8>,
    #[serde(default)]
    pub default_message_notifications: Option<u8>,
    #[serde(default)]
    pub explicit_content_filter: Option<u8>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionOverwrite {
    pub id: Snowflake,
    /// 0 = role, 1 = member.
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub user_limit: Option<u32>,
    #[serde(default)]
    pub rate_limit_per_user: Option<u32>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    #[serde(default)]
    pub joined_at: Option<String>,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub edited_timestamp: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Webhook {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invite {
    pub code: String,
    #[serde(default)]
    pub channel: Option<serde_json::Value>,
    #[serde(default)]
    pub guild: Option<serde_json::Value>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub temporary: Option<bool>,
    #[serde(default)]
    pub uses: Option<u32>,
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModifyGuild {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub icon: Nullable<ImageData>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub afk_channel_id: Nullable<Snowflake>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub afk_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub system_channel_id: Nullable<Snowflake>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub verification_level: Nullable<u8>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub default_message_notifications: Nullable<u8>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub explicit_content_filter: Nullable<u8>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateChannel {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_user: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Snowflake>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nsfw: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModifyChannel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub topic: Nullable<String>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub position: Nullable<i32>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub parent_id: Nullable<Snowflake>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nsfw: Option<bool>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub bitrate: Nullable<u32>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub user_limit: Nullable<u32>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub rate_limit_per_user: Nullable<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_overwrites: Option<Vec<PermissionOverwrite>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EditPermissions {
    /// 0 = role, 1 = member.
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Permissions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<Permissions>,
}

/// Body of create and modify role calls.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoleParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub color: Nullable<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hoist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentionable: Option<bool>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub icon: Nullable<ImageData>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RolePosition {
    pub id: Snowflake,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModifyMember {
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub nick: Nullable<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Snowflake>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deaf: Option<bool>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub channel_id: Nullable<Snowflake>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub communication_disabled_until: Nullable<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EditMessage {
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub content: Nullable<String>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub embeds: Nullable<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateWebhook {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<ImageData>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModifyWebhook {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Nullable::is_unset")]
    pub avatar: Nullable<ImageData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateInvite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nullable_distinguishes_unset_null_and_value() {
        let params = ModifyChannel {
            name: Some("general".into()),
            topic: Nullable::Null,
            parent_id: Nullable::Value(Snowflake::new(42)),
            ..Default::default()
        };
        let v = serde_json::to_value(&params).unwrap();
        assert_eq!(
            v,
            json!({"name": "general", "topic": null, "parent_id": "42"})
        );
    }

    #[test]
    fn nullable_zero_is_a_value() {
        let params = RoleParams {
            color: Nullable::Value(0),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"color": 0}));
        assert_eq!(serde_json::to_value(RoleParams::default()).unwrap(), json!({}));
    }

    #[test]
    fn nullable_deserializes_null_as_null() {
        #[derive(Deserialize)]
        struct TopicPatch {
            #[serde(default)]
            topic: Nullable<String>,
        }
        let absent: TopicPatch = serde_json::from_str("{}").unwrap();
        let null: TopicPatch = serde_json::from_str(r#"{"topic":null}"#).unwrap();
        let set: TopicPatch = serde_json::from_str(r#"{"topic":"x"}"#).unwrap();
        assert_eq!(absent.topic, Nullable::Unset);
        assert_eq!(null.topic, Nullable::Null);
        assert_eq!(set.topic, Nullable::Value("x".into()));
    }

    #[test]
    fn permissions_are_strings_on_the_wire() {
        let p = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
        assert_eq!(serde_json::to_value(p).unwrap(), json!("3072"));
        let role: Role = serde_json::from_value(json!({
            "id": "1", "name": "mod", "permissions": "8"
        }))
        .unwrap();
        assert!(role.permissions.contains(Permissions::ADMINISTRATOR));
    }

    #[test]
    fn image_data_uri() {
        let img = ImageData::detect(b"\x89PNG\r\n\x1a\n\x00").unwrap();
        assert_eq!(img.as_str(), "data:image/png;base64,iVBORw0KGgoA");
        assert!(ImageData::detect(b"plain text").is_none());
    }

    #[test]
    fn channel_ignores_unknown_fields() {
        let ch: Channel = serde_json::from_value(json!({
            "id": "41771983423143937",
            "type": 0,
            "guild_id": "41771983423143938",
            "name": "general",
            "last_message_id": "155117677105512449",
            "flags": 0
        }))
        .unwrap();
        assert_eq!(ch.id, Snowflake::new(41771983423143937));
        assert_eq!(ch.guild_id, Some(Snowflake::new(41771983423143938)));
    }
}
