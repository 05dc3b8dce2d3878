//! Compression options for the image creation tool.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    /// gzip (default).
    #[default]
    Gzip,
    /// xz.
    Xz,
    /// bzip2.
    Bzip2,
    /// lzma.
    Lzma,
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip => write!(f, "gzip"),
            Self::Xz => write!(f, "xz"),
            Self::Bzip2 => write!(f, "bzip2"),
            Self::Lzma => write!(f, "lzma"),
        }
    }
}

/// How the creation tool compresses.
///
/// `level` and `threads` only exist for the built-in methods. The creation
/// tool has no option for them, so built-in choices are kept as a record of
/// the caller's settings and add nothing to its argv. `Custom` carries raw
/// arguments for the creation tool, split on whitespace and passed through
/// without validation or escaping; sanitize them before storing them here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CompressionOptions {
    /// A built-in method.
    Builtin {
        /// The method.
        kind: CompressionMethod,
        /// Level, 0..=9.
        level: u8,
        /// Worker threads, 0 for all cores.
        threads: u32,
    },
    /// Caller-supplied creation tool arguments.
    Custom {
        /// Whitespace-separated arguments.
        command: String,
    },
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self::Builtin {
            kind: CompressionMethod::Gzip,
            level: 6,
            threads: 0,
        }
    }
}

impl CompressionOptions {
    /// Highest accepted level.
    pub const MAX_LEVEL: u8 = 9;

    /// Creates built-in options, clamping the level to 0..=9.
    #[must_use]
    pub fn builtin(kind: CompressionMethod, level: u8, threads: u32) -> Self {
        Self::Builtin {
            kind,
            level: level.min(Self::MAX_LEVEL),
            threads,
        }
    }

    /// Creates custom options.
    #[must_use]
    pub fn custom(command: impl Into<String>) -> Self {
        Self::Custom {
            command: command.into(),
        }
    }

    /// Returns an error message if the options are out of range.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Builtin { level, .. } if *level > Self::MAX_LEVEL => Err(format!(
                "compression level {level} is outside 0..={}",
                Self::MAX_LEVEL
            )),
            Self::Custom { command } if command.trim().is_empty() => {
                Err("custom compression command is empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Arguments appended to the creation invocation.
    ///
    /// Empty for the built-in methods.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::Builtin { .. } => Vec::new(),
            Self::Custom { command } => command.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_gzip_6() {
        assert_eq!(
            CompressionOptions::default(),
            CompressionOptions::builtin(CompressionMethod::Gzip, 6, 0)
        );
    }

    #[test]
    fn test_level_is_clamped() {
        let options = CompressionOptions::builtin(CompressionMethod::Xz, 42, 4);
        assert_eq!(
            options,
            CompressionOptions::Builtin {
                kind: CompressionMethod::Xz,
                level: 9,
                threads: 4,
            }
        );
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builtin_adds_no_arguments() {
        for kind in [
            CompressionMethod::Gzip,
            CompressionMethod::Xz,
            CompressionMethod::Bzip2,
            CompressionMethod::Lzma,
        ] {
            assert!(CompressionOptions::builtin(kind, 9, 2).to_args().is_empty());
        }
    }

    #[test]
    fn test_custom_passes_through() {
        let options = CompressionOptions::custom("-zisofs  level=9");
        assert_eq!(options.to_args(), vec!["-zisofs", "level=9"]);
        assert!(CompressionOptions::custom("  ").validate().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(CompressionOptions::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"method": "builtin", "kind": "gzip", "level": 6, "threads": 0})
        );
        let back: CompressionOptions =
            serde_json::from_value(serde_json::json!({"method": "custom", "command": "lz4"})).unwrap();
        assert_eq!(back, CompressionOptions::custom("lz4"));
    }

    #[test]
    fn test_out_of_range_deserialized_level_fails_validation() {
        let options: CompressionOptions = serde_json::from_value(
            serde_json::json!({"method": "builtin", "kind": "bzip2", "level": 12, "threads": 0}),
        )
        .unwrap();
        assert!(options.validate().is_err());
    }
}
