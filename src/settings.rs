//! Per-shop app settings stored in the `app_settings.general_setting`
//! metafield.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const SETTINGS_VERSION: u32 = 1;

fn current_version() -> u32 {
    SETTINGS_VERSION
}

/// Settings edited by the merchant in the embedded UI.
///
/// Values written before versioning carry no `version` field and are read
/// as version 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralSettings {
    #[serde(default = "current_version")]
    pub version: u32,
    /// Bot path, e.g. `acme/support`. Required.
    pub quriobot_path: String,
    /// Optional init snippet passed to the embed script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quriobot_init: Option<String>,
}

impl GeneralSettings {
    /// Parse and validate settings sent by the UI.
    pub fn from_request(value: serde_json::Value) -> Result<Self, AppError> {
        let settings: GeneralSettings = serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("invalid config: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse the stored metafield value.
    pub fn from_stored(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Internal(format!("stored settings unreadable: {e}")))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.version > SETTINGS_VERSION {
            return Err(AppError::BadRequest(format!(
                "unsupported settings version {}",
                self.version
            )));
        }
        if self.quriobot_path.trim().is_empty() {
            return Err(AppError::BadRequest("quriobot_path is required".into()));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(|e| AppError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unversioned_values_read_as_current_version() {
        let s = GeneralSettings::from_stored(r#"{"quriobot_path":"acme/bot","quriobot_init":""}"#)
            .unwrap();
        assert_eq!(s.version, SETTINGS_VERSION);
        assert_eq!(s.quriobot_init.as_deref(), Some(""));
    }

    #[test]
    fn path_is_required() {
        let err = GeneralSettings::from_request(json!({ "quriobot_path": "  " })).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = GeneralSettings::from_request(json!({ "quriobot_init": "x" })).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn unknown_fields_and_future_versions_are_rejected() {
        assert!(GeneralSettings::from_request(json!({ "quriobot_path": "a", "extra": 1 })).is_err());
        assert!(GeneralSettings::from_request(json!({ "quriobot_path": "a", "version": 99 })).is_err());
    }

    #[test]
    fn serialized_form_carries_version() {
        let s = GeneralSettings::from_request(json!({ "quriobot_path": "acme/bot" })).unwrap();
        let stored = s.to_json().unwrap();
        assert_eq!(stored, r#"{"version":1,"quriobot_path":"acme/bot"}"#);
        assert_eq!(GeneralSettings::from_stored(&stored).unwrap(), s);
    }
}
