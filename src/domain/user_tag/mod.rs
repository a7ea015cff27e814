//! User tag (RFID / idTag credential)

use chrono::{DateTime, Utc};

/// Credential record resolved from an OCPP idTag.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTag {
    pub id_tag: String,
    pub username: String,
    pub note: String,
    pub enabled: bool,
    pub date_registered: DateTime<Utc>,
}

impl UserTag {
    pub fn new(id_tag: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id_tag: id_tag.into(),
            username: username.into(),
            note: String::new(),
            enabled: true,
            date_registered: Utc::now(),
        }
    }

    /// Tag created on first sight when tag auto-registration is enabled.
    pub fn auto_registered(id_tag: &str) -> Self {
        let mut tag = Self::new(id_tag, id_tag);
        tag.note = "registered on first use".to_string();
        tag
    }
}
