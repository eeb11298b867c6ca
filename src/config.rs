use crate::error::ConfigError;

/// Default maximum boundary length, the RFC 2046 limit of 70 characters.
pub const DEFAULT_MAX_BOUNDARY_LENGTH: usize = 70;

/// Tuning knobs for [`MultipartReader`](crate::MultipartReader).
///
/// None of these are upload size limits. Callers decide how many body bytes
/// they are willing to read and simply stop reading when that is exceeded.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Longest accepted boundary in bytes.
    ///
    /// The body lookahead never exceeds the `\r\n--boundary` delimiter plus
    /// one byte, so this is what bounds the peek window.
    pub max_boundary_length: usize,
    /// Maximum length in bytes of a single preamble, delimiter, or header line.
    pub max_line_length: Option<usize>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_boundary_length: DEFAULT_MAX_BOUNDARY_LENGTH,
            max_line_length: None,
        }
    }
}

impl ReaderConfig {
    /// Creates a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates configured limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_boundary_length == 0 {
            return Err(ConfigError::InvalidLimitValue {
                limit: "max_boundary_length",
            });
        }

        if self.max_line_length == Some(0) {
            return Err(ConfigError::InvalidLimitValue {
                limit: "max_line_length",
            });
        }

        Ok(())
    }
}
