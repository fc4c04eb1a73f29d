//! Cache configuration and logging context.
//!
//! Caches never read process-wide state. Everything they need to know about
//! where to live, how long entries stay fresh and where to log is carried by a
//! [`CacheContext`] that the caller builds and passes in.

use chrono::{FixedOffset, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Span;

use crate::error::{DataError, Result};

/// Default cache namespace (subdirectory of the user cache directory).
pub const DEFAULT_NAMESPACE: &str = "tushare";

/// Default database file name inside the cache directory.
pub const DEFAULT_DATABASE_FILE: &str = "equity.db";

/// Default time-to-live for report types without a calendar policy.
pub const DEFAULT_FIXED_TTL: Duration = Duration::from_secs(60 * 60);

/// What a blob cache does when a stored payload cannot be decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Return [`DataError::CacheCorruption`] to the caller.
    #[default]
    Propagate,
    /// Log a warning, refetch and overwrite the entry.
    Refetch,
}

/// Explicitly constructed cache configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tsdata_core::{CacheContext, CorruptionPolicy};
///
/// let ctx = CacheContext::new("tushare")
///     .with_cache_dir("/tmp/tsdata")
///     .with_fixed_ttl(Duration::from_secs(600))
///     .with_corruption_policy(CorruptionPolicy::Refetch);
///
/// assert!(ctx.database_path().ends_with("equity.db"));
/// ```
#[derive(Clone, Debug)]
pub struct CacheContext {
    namespace: String,
    cache_dir: PathBuf,
    database_file: String,
    fixed_ttl: Duration,
    timezone: Option<FixedOffset>,
    corruption_policy: CorruptionPolicy,
    span: Span,
}

impl CacheContext {
    /// Create a context for `namespace`, rooted in the user cache directory.
    ///
    /// Falls back to `./.cache/<namespace>` when the platform has no cache directory.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join(&namespace);
        let span = tracing::info_span!("tsdata_cache", namespace = %namespace);
        Self {
            namespace,
            cache_dir,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            fixed_ttl: DEFAULT_FIXED_TTL,
            timezone: None,
            corruption_policy: CorruptionPolicy::default(),
            span,
        }
    }

    /// Use `dir` instead of the user cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Use `file` as the database file name.
    #[must_use]
    pub fn with_database_file(mut self, file: impl Into<String>) -> Self {
        self.database_file = file.into();
        self
    }

    /// Set the TTL for report types without a calendar policy.
    #[must_use]
    pub const fn with_fixed_ttl(mut self, ttl: Duration) -> Self {
        self.fixed_ttl = ttl;
        self
    }

    /// Evaluate year and quarter boundaries at this UTC offset.
    ///
    /// Without a pinned offset the local offset is read on every call to
    /// [`timezone`](Self::timezone), so daylight saving changes are followed.
    #[must_use]
    pub const fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = Some(timezone);
        self
    }

    /// Set the blob cache corruption policy.
    #[must_use]
    pub const fn with_corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.corruption_policy = policy;
        self
    }

    /// Emit cache logs inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The cache namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Directory holding the cache database.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Full path of the cache database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.cache_dir.join(&self.database_file)
    }

    /// TTL for report types without a calendar policy.
    #[must_use]
    pub const fn fixed_ttl(&self) -> Duration {
        self.fixed_ttl
    }

    /// Offset used for calendar boundaries: the pinned offset, or the current
    /// local offset.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        self.timezone.unwrap_or_else(|| *Local::now().offset())
    }

    /// Blob cache corruption policy.
    #[must_use]
    pub const fn corruption_policy(&self) -> CorruptionPolicy {
        self.corruption_policy
    }

    /// Span cache operations log under.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Create the cache directory if it does not exist yet.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the directory cannot be created.
    pub fn ensure_cache_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| {
            DataError::Configuration(format!(
                "Cannot create cache directory {}: {e}",
                self.cache_dir.display()
            ))
        })?;
        Ok(&self.cache_dir)
    }
}

impl Default for CacheContext {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = CacheContext::default();
        assert_eq!(ctx.namespace(), "tushare");
        assert_eq!(ctx.fixed_ttl(), Duration::from_secs(3600));
        assert_eq!(ctx.corruption_policy(), CorruptionPolicy::Propagate);
        assert!(ctx.cache_dir().ends_with("tushare"));
        assert!(ctx.database_path().ends_with("tushare/equity.db"));
    }

    #[test]
    fn test_default_timezone_is_read_at_lookup() {
        let ctx = CacheContext::new("test");
        assert_eq!(ctx.timezone, None);
        assert_eq!(ctx.timezone(), *Local::now().offset());

        let clone = ctx.clone();
        assert_eq!(clone.timezone, None);
    }

    #[test]
    fn test_builder_overrides() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let ctx = CacheContext::new("test")
            .with_cache_dir("/var/cache/test")
            .with_database_file("cache.db")
            .with_timezone(tz)
            .with_fixed_ttl(Duration::from_secs(5));

        assert_eq!(ctx.database_path(), PathBuf::from("/var/cache/test/cache.db"));
        assert_eq!(ctx.timezone(), tz);
        assert_eq!(ctx.fixed_ttl(), Duration::from_secs(5));
    }
}
