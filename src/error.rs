//! Application-wide error types.
//!
//! One crate-level error enum covers all subsystems. Recoverable lock
//! outcomes ([`Error::Locked`], [`Error::NoSuchLock`]) are variants rather
//! than separate types so callers can match on them directly.

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lease is held by another holder. Recoverable; callers poll and retry.
    #[error("locked")]
    Locked,

    /// Lease was already released, or expired and reclaimed by someone else.
    /// Safe to treat as a no-op when unlocking or refreshing defensively.
    #[error("no such lock")]
    NoSuchLock,

    /// Nothing is playing for the current user.
    #[error("user {user} must listen to music")]
    NoCurrentTrack { user: String },

    /// A user-supplied pattern did not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Payload (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Upstream provider failure, already stringified by the adaptor.
    #[error("provider error: {0}")]
    Provider(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True for the lock outcome callers are expected to tolerate.
    pub fn is_no_such_lock(&self) -> bool {
        matches!(self, Self::NoSuchLock)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, serde_json::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Serialization(e).context(ctx))
    }
}
