//! Input validation for client-supplied documents

use crate::models::{CapabilityDeclaration, CapabilityProfile};
use crate::Error;

/// Maximum device id length
pub const DEVICE_ID_MAX: usize = 128;
/// Maximum number of entries in any single profile list
pub const PROFILE_LIST_MAX: usize = 256;

/// Validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },

    #[error("Multiple validation errors: {0}")]
    Multiple(String),
}

impl ValidationError {
    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::InvalidCapability(err.to_string())
    }
}

/// Validation result
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Capability declaration validator
#[derive(Debug, Default)]
pub struct CapabilityValidator;

impl CapabilityValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn validate(&self, declaration: &CapabilityDeclaration) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = validate_device_id(declaration.device_id.as_str()) {
            errors.push(e);
        }
        errors.extend(self.profile_errors(&declaration.profile));

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }

    fn profile_errors(&self, profile: &CapabilityProfile) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let lists = [
            ("directPlayProfiles", profile.direct_play_profiles.len()),
            ("codecProfiles", profile.codec_profiles.len()),
            ("transcodingProfiles", profile.transcoding_profiles.len()),
            ("subtitleProfiles", profile.subtitle_profiles.len()),
        ];
        for (field, len) in lists {
            if len > PROFILE_LIST_MAX {
                errors.push(ValidationError::field(
                    field,
                    format!("must contain at most {PROFILE_LIST_MAX} entries"),
                ));
            }
        }

        for (i, dp) in profile.direct_play_profiles.iter().enumerate() {
            if dp.container.trim().is_empty() {
                errors.push(ValidationError::field(
                    format!("directPlayProfiles[{i}].container"),
                    "must not be empty",
                ));
            }
        }

        for (i, tp) in profile.transcoding_profiles.iter().enumerate() {
            if tp.container.trim().is_empty() {
                errors.push(ValidationError::field(
                    format!("transcodingProfiles[{i}].container"),
                    "must not be empty",
                ));
            }
            if tp.protocol.is_none() {
                errors.push(ValidationError::field(
                    format!("transcodingProfiles[{i}].protocol"),
                    "is required",
                ));
            }
        }

        for (i, cp) in profile.codec_profiles.iter().enumerate() {
            if cp.codec.trim().is_empty() {
                errors.push(ValidationError::field(
                    format!("codecProfiles[{i}].codec"),
                    "must not be empty",
                ));
            }
        }

        errors
    }
}

/// Validate a device id: non-blank, bounded, no control characters
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    if device_id.trim().is_empty() {
        return Err(ValidationError::field("deviceId", "must not be empty"));
    }

    if device_id.chars().count() > DEVICE_ID_MAX {
        return Err(ValidationError::field(
            "deviceId",
            format!("must be at most {DEVICE_ID_MAX} characters"),
        ));
    }

    if device_id.chars().any(char::is_control) {
        return Err(ValidationError::field(
            "deviceId",
            "must not contain control characters",
        ));
    }

    Ok(())
}
