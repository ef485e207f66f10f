//! Error types for the modlink system.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for modlink operations.
pub type Result<T> = std::result::Result<T, ModlinkError>;

/// Broad classification used when reporting a failure to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// An intentional refusal: conflicting names, occupied link slots, reserved names.
    Domain,
    /// The current unit of work cannot proceed and must not be retried automatically.
    Fatal,
    /// Anything else, usually an environment problem or a bug.
    Unexpected,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Fatal => "fatal",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the modlink system.
#[derive(Debug, thiserror::Error)]
pub enum ModlinkError {
    /// The module name is already bound to another file
    #[error("{name} is already mapped to {existing}")]
    AlreadyMapped { name: String, existing: String },

    /// The link slot for a module cannot take the requested link
    #[error("can not link module {name}: {reason}")]
    LinkConflict { name: String, reason: String },

    /// The declared name collides with a runtime builtin module
    #[error("{0} is the name of a builtin module. Refusing to create a symlink of the same name")]
    ReservedName(String),

    /// Removal was refused because the entry is real content, not a link
    #[error("can not unlink {0}: it is not a symlink")]
    NotASymlink(PathBuf),

    /// The path exists but is neither a regular file nor a symlink
    #[error("Attempting to process {0}, but it is not a file")]
    NotAFile(PathBuf),

    /// A declared token is not usable as a module name
    #[error("Invalid module name: {0:?}")]
    InvalidModuleName(String),

    /// No enclosing project root exists for a file that declares a name
    #[error("Unable to find an appropriate link directory for {0}")]
    NoProjectRoot(PathBuf),

    /// The persisted module map could not be written
    #[error("Failed to persist module map {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted module map exists but cannot be understood
    #[error("Module map {path} is corrupt: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// The rebuild tool refused to apply a partially valid record
    #[error("unable to link all files from the module map: {}", conflicts.join("; "))]
    RelinkAborted { conflicts: Vec<String> },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File watching errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModlinkError {
    /// Create a new link conflict error
    pub fn link_conflict(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LinkConflict {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a new corrupt record error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error for reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyMapped { .. }
            | Self::LinkConflict { .. }
            | Self::ReservedName(_)
            | Self::NotASymlink(_)
            | Self::NotAFile(_)
            | Self::InvalidModuleName(_) => ErrorClass::Domain,
            Self::NoProjectRoot(_)
            | Self::Persist { .. }
            | Self::CorruptRecord { .. }
            | Self::RelinkAborted { .. }
            | Self::Config(_) => ErrorClass::Fatal,
            Self::Watch(_) | Self::Serialization(_) | Self::Io(_) | Self::Other(_) => {
                ErrorClass::Unexpected
            }
        }
    }

    /// Check if this is a name conflict
    pub fn is_already_mapped(&self) -> bool {
        matches!(self, Self::AlreadyMapped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = ModlinkError::AlreadyMapped {
            name: "foo".into(),
            existing: "a.js".into(),
        };
        assert_eq!(err.class(), ErrorClass::Domain);
        assert!(err.is_already_mapped());

        let err = ModlinkError::NoProjectRoot(PathBuf::from("/a.js"));
        assert_eq!(err.class(), ErrorClass::Fatal);

        let err = ModlinkError::from(std::io::Error::other("disk on fire"));
        assert_eq!(err.class(), ErrorClass::Unexpected);
    }

    #[test]
    fn test_relink_message_names_conflicts() {
        let err = ModlinkError::RelinkAborted {
            conflicts: vec!["a: taken".into(), "b: taken".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a: taken"));
        assert!(msg.contains("b: taken"));
    }
}
