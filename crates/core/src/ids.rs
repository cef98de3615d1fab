use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::CoreError;

/// Owner token used in flash ids minted before anyone has logged in.
pub const ANONYMOUS_MARKER: &str = "anonymous";

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(LocalId);
string_id!(UserId);

impl LocalId {
    /// Time-ordered prefix followed by random bits (UUIDv7 text form).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Who a flash id belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerToken {
    Anonymous,
    User(UserId),
}

impl OwnerToken {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Anonymous => ANONYMOUS_MARKER,
            Self::User(user) => user.as_str(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    fn parse(token: &str) -> Self {
        if token == ANONYMOUS_MARKER {
            Self::Anonymous
        } else {
            Self::User(UserId::from_string(token))
        }
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portable note identity shared with the remote service: `<timestamp_ms>_<owner>`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlashId(String);

impl FlashId {
    pub fn mint(timestamp_ms: i64, owner: &OwnerToken) -> Self {
        Self(format!("{timestamp_ms}_{}", owner.as_str()))
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let (ts, owner) = value
            .split_once('_')
            .ok_or_else(|| CoreError::InvalidFlashId(value.to_string()))?;
        if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidFlashId(value.to_string()));
        }
        if owner.trim().is_empty() {
            return Err(CoreError::InvalidFlashId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn timestamp_ms(&self) -> i64 {
        // parse() guarantees a digit prefix; only overflow can fail here
        self.0
            .split_once('_')
            .and_then(|(ts, _)| ts.parse().ok())
            .unwrap_or(0)
    }

    pub fn owner(&self) -> OwnerToken {
        let owner = self.0.split_once('_').map(|(_, o)| o).unwrap_or_default();
        OwnerToken::parse(owner)
    }

    pub fn is_anonymous(&self) -> bool {
        self.owner().is_anonymous()
    }
}

impl TryFrom<String> for FlashId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FlashId> for String {
    fn from(id: FlashId) -> Self {
        id.0
    }
}

impl fmt::Debug for FlashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlashId({})", self.0)
    }
}

impl fmt::Display for FlashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
