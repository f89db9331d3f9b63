//! Configuration validation with range checks.

use std::collections::HashSet;

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.external_tool_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.external_tool_timeout_ms must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.thumbnails.quality) {
            return Err(ConfigError::ValidationError(
                "thumbnails.quality must be between 1 and 100".into(),
            ));
        }
        if self.thumbnails.sizes.is_empty() {
            return Err(ConfigError::ValidationError(
                "thumbnails.sizes must not be empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for size in &self.thumbnails.sizes {
            if size.width == 0 || size.height == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "thumbnails.sizes: {} must have width and height > 0",
                    size.size
                )));
            }
            if !seen.insert(size.size) {
                return Err(ConfigError::ValidationError(format!(
                    "thumbnails.sizes: {} listed more than once",
                    size.size
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "search.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.search.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "search.page_size must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.export.quality) {
            return Err(ConfigError::ValidationError(
                "export.quality must be between 1 and 100".into(),
            ));
        }
        if self.external_tool.enabled && self.external_tool.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "external_tool.program must be set when the tool is enabled".into(),
            ));
        }
        Ok(())
    }
}
