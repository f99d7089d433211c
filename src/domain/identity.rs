use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, EngineError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(EngineError::ValidationError(format!(
                        "{} must not be empty",
                        $label
                    )));
                }
                // Control characters would break the NUL-separated store keys.
                if value.chars().any(char::is_control) {
                    return Err(EngineError::ValidationError(format!(
                        "{} must not contain control characters",
                        $label
                    )));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EngineError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Identity of the acting student, resolved from the session by the caller.
    UserId,
    "User id"
);

opaque_id!(
    /// Identity of the purchased course.
    CourseId,
    "Course id"
);
