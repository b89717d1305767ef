use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UpdateId);
id_newtype!(ReleaseChannel);
id_newtype!(RuntimeVersion);

/// Engine-assigned classification of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntryCode {
    None,
    NoUpdatesAvailable,
    UpdateAssetsNotAvailable,
    UpdateServerUnreachable,
    UpdateHasInvalidSignature,
    UpdateCodeSigningError,
    UpdateFailedToLoad,
    AssetsFailedToLoad,
    #[serde(rename = "JSRuntimeError")]
    JsRuntimeError,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntryLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}
