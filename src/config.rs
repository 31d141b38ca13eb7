//! Container format configuration.
//!
//! The same logical format serves 16, 32 and 64-bit consuming runtimes by
//! varying two widths: the size of a pointer (heap offset) and the size of
//! an array count. Both are fixed for the lifetime of one output file.
//!
//! # Example
//!
//! ```rust
//! use objc_metadata::config::FormatConfig;
//!
//! let config = FormatConfig::builder()
//!     .pointer_size(2)
//!     .array_count_size(1)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.pointer_size, 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, MetaResult};

/// Widths used by every writer and reader of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Size of an offset in bytes.
    pub pointer_size: u8,
    /// Size of an array count in bytes.
    pub array_count_size: u8,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            pointer_size: 4,
            array_count_size: 4,
        }
    }
}

impl FormatConfig {
    /// Create a new builder for `FormatConfig`.
    pub fn builder() -> FormatConfigBuilder {
        FormatConfigBuilder::default()
    }

    /// Create a configuration from explicit widths.
    pub fn new(pointer_size: u8, array_count_size: u8) -> Self {
        Self {
            pointer_size,
            array_count_size,
        }
    }

    /// Check that both widths are in `1..=8`.
    pub fn validate(&self) -> MetaResult<()> {
        check_width("pointer_size", self.pointer_size)?;
        check_width("array_count_size", self.array_count_size)
    }

    /// Largest offset representable with this pointer width.
    pub fn max_offset(&self) -> u64 {
        max_for_width(self.pointer_size)
    }

    /// Largest count representable with this array-count width.
    pub fn max_array_count(&self) -> u64 {
        max_for_width(self.array_count_size)
    }
}

fn check_width(name: &'static str, value: u8) -> MetaResult<()> {
    if (1..=8).contains(&value) {
        Ok(())
    } else {
        Err(MetaError::InvalidWidth { name, value })
    }
}

pub(crate) fn max_for_width(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (u32::from(width) * 8)) - 1
    }
}

/// Builder for `FormatConfig`.
#[derive(Debug, Default)]
pub struct FormatConfigBuilder {
    config: FormatConfig,
}

impl FormatConfigBuilder {
    /// Set the pointer width in bytes.
    pub fn pointer_size(mut self, value: u8) -> Self {
        self.config.pointer_size = value;
        self
    }

    /// Set the array-count width in bytes.
    pub fn array_count_size(mut self, value: u8) -> Self {
        self.config.array_count_size = value;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> FormatConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_widths() {
        let config = FormatConfig::default();
        assert_eq!(config.pointer_size, 4);
        assert_eq!(config.array_count_size, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_and_nine() {
        let err = FormatConfig::new(0, 4).validate().unwrap_err();
        assert!(matches!(
            err,
            MetaError::InvalidWidth {
                name: "pointer_size",
                value: 0
            }
        ));
        assert!(FormatConfig::new(4, 9).validate().is_err());
    }

    #[test]
    fn test_max_values() {
        assert_eq!(FormatConfig::new(2, 1).max_offset(), 0xFFFF);
        assert_eq!(FormatConfig::new(2, 1).max_array_count(), 0xFF);
        assert_eq!(FormatConfig::new(8, 8).max_offset(), u64::MAX);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = FormatConfig::builder().pointer_size(8).build();
        let json = serde_json::to_string(&config).unwrap();
        let back: FormatConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
