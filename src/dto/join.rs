use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dto::validation::{validate_nickname, validate_pin};

/// Longest device identifier accepted.
const DEVICE_ID_MAX_LEN: usize = 128;

/// Join request sent by a player device.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequest {
    /// Six digit room PIN.
    pub pin: String,
    /// Display name, unique within the room.
    pub nickname: String,
    /// Identifier persisted on the device, used to recover the seat.
    pub device_id: String,
}

impl JoinRequest {
    /// Nickname with surrounding whitespace removed.
    pub fn trimmed_nickname(&self) -> &str {
        self.nickname.trim()
    }
}

impl Validate for JoinRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_pin(&self.pin) {
            errors.add("pin", e);
        }

        if let Err(e) = validate_nickname(&self.nickname) {
            errors.add("nickname", e);
        }

        if self.device_id.is_empty() || self.device_id.len() > DEVICE_ID_MAX_LEN {
            let mut err = ValidationError::new("device_id_length");
            err.message = Some(
                format!("Device ID must be between 1 and {DEVICE_ID_MAX_LEN} bytes").into(),
            );
            errors.add("device_id", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Seat granted by the join gate.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    /// Always `true`.
    pub success: bool,
    /// Row bound to the device.
    pub player_id: Uuid,
    /// Room the PIN resolved to.
    pub room_id: Uuid,
    /// Whether an existing seat of this device was returned.
    pub reconnected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pin: &str, nickname: &str, device_id: &str) -> JoinRequest {
        JoinRequest {
            pin: pin.into(),
            nickname: nickname.into(),
            device_id: device_id.into(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request("123456", " Ana ", "dev").validate().is_ok());
        assert_eq!(request("123456", " Ana ", "dev").trimmed_nickname(), "Ana");
    }

    #[test]
    fn each_invalid_field_is_reported() {
        let errors = request("12", "", "").validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("pin"));
        assert!(fields.contains_key("nickname"));
        assert!(fields.contains_key("device_id"));
    }
}
