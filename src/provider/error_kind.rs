//! Provider failure classification.
//!
//! Error kinds are derived from free-text error messages using ordered
//! substring pattern tables. The tables are data, not scattered
//! conditionals, so the classification policy is independently testable.

use serde::{Deserialize, Serialize};

/// Classified kind of a provider failure.
///
/// The kind determines retry eligibility: transient kinds are retried with
/// escalating timeouts, permanent kinds skip straight to the fallback
/// architect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// HTTP 429 / too-many-requests style throttling.
    RateLimit,
    /// Daily or monthly API quota exhausted.
    QuotaExceeded,
    /// Network-level failure reaching the provider.
    ConnectionError,
    /// Provider-side usage ceiling (e.g. plan limit reached).
    UsageLimit,
    /// Missing or rejected API key.
    ApiKeyInvalid,
    /// The call exceeded its allotted timeout.
    Timeout,
    /// Anything that does not match a known pattern.
    Unknown,
}

/// Substring patterns checked in order; the first table whose entry matches
/// the lowercased message decides the kind. Ordering matters: quota wording
/// often contains "limit", so quota patterns are checked before usage-limit
/// patterns.
const RATE_LIMIT_PATTERNS: &[&str] = &["429", "rate limit", "too many requests"];

const QUOTA_PATTERNS: &[&str] = &[
    "quota exceeded",
    "quota_exceeded",
    "resource_exhausted",
    "daily quota",
    "monthly quota",
    "quota exhaust",
];

const USAGE_LIMIT_PATTERNS: &[&str] = &["limit reached", "usage limit", "daily limit"];

const API_KEY_PATTERNS: &[&str] = &[
    "api key not valid",
    "api_key_invalid",
    "invalid api key",
    "api key is invalid",
    "unauthorized",
    "authentication failed",
];

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout"];

const CONNECTION_PATTERNS: &[&str] = &["connection", "network", "unavailable", "not found in path"];

/// Phrases that indicate a zero-exit reply is actually a usage-limit
/// failure dressed up as a success.
const LIMIT_REPLY_PATTERNS: &[&str] = &[
    "limit reached",
    "usage limit",
    "daily limit",
    "too many requests",
    "rate limit",
];

impl ErrorKind {
    /// All kinds, in classification order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::RateLimit,
        ErrorKind::QuotaExceeded,
        ErrorKind::ConnectionError,
        ErrorKind::UsageLimit,
        ErrorKind::ApiKeyInvalid,
        ErrorKind::Timeout,
        ErrorKind::Unknown,
    ];

    /// Classify an error message into a kind.
    ///
    /// Matching is case-insensitive substring search over the message, most
    /// specific table first. An empty message classifies as [`Unknown`].
    ///
    /// [`Unknown`]: ErrorKind::Unknown
    ///
    /// # Example
    ///
    /// ```
    /// use promethean::provider::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::classify("HTTP 429: slow down"), ErrorKind::RateLimit);
    /// assert_eq!(ErrorKind::classify("daily quota exceeded"), ErrorKind::QuotaExceeded);
    /// assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Unknown);
    /// ```
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.is_empty() {
            return Self::Unknown;
        }
        let text = message.to_lowercase();

        let tables: [(&[&str], ErrorKind); 6] = [
            (RATE_LIMIT_PATTERNS, Self::RateLimit),
            (QUOTA_PATTERNS, Self::QuotaExceeded),
            (USAGE_LIMIT_PATTERNS, Self::UsageLimit),
            (API_KEY_PATTERNS, Self::ApiKeyInvalid),
            (TIMEOUT_PATTERNS, Self::Timeout),
            (CONNECTION_PATTERNS, Self::ConnectionError),
        ];

        for (patterns, kind) in tables {
            if patterns.iter().any(|p| text.contains(p)) {
                return kind;
            }
        }

        Self::Unknown
    }

    /// Check if this kind is transient and eligible for retry.
    ///
    /// `Unknown` counts as transient but is bounded by the attempt budget of
    /// the retry policy rather than retried indefinitely.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ConnectionError | Self::Timeout | Self::Unknown
        )
    }

    /// Check if this kind is permanent (no retry; fall back immediately).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RateLimit => "rate_limit",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ConnectionError => "connection_error",
            Self::UsageLimit => "usage_limit",
            Self::ApiKeyInvalid => "api_key_invalid",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Check whether a reply that arrived with a success exit status is in fact
/// a provider limit message.
///
/// Some CLI back ends print "limit reached" banners to stdout and exit
/// zero; treating those as real replies would poison the conversation.
#[must_use]
pub fn is_limit_reply(reply: &str) -> bool {
    if reply.is_empty() {
        return false;
    }
    let lower = reply.to_lowercase();
    LIMIT_REPLY_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(
            ErrorKind::classify("HTTP 429: Too Many Requests"),
            ErrorKind::RateLimit
        );
        assert_eq!(
            ErrorKind::classify("Rate limit hit, slow down"),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_classify_quota_before_usage_limit() {
        // "daily quota exceeded" mentions neither usage-limit phrase but
        // quota wording must win even when both could apply.
        assert_eq!(
            ErrorKind::classify("RESOURCE_EXHAUSTED: daily quota exceeded"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            ErrorKind::classify("monthly quota used up"),
            ErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn test_classify_usage_limit() {
        assert_eq!(
            ErrorKind::classify("Claude usage limit reached until 5pm"),
            ErrorKind::UsageLimit
        );
    }

    #[test]
    fn test_classify_api_key() {
        assert_eq!(
            ErrorKind::classify("API key not valid. Please pass a valid key."),
            ErrorKind::ApiKeyInvalid
        );
    }

    #[test]
    fn test_classify_timeout_and_connection() {
        assert_eq!(
            ErrorKind::classify("request timed out after 60 seconds"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::classify("network unreachable"),
            ErrorKind::ConnectionError
        );
    }

    #[test]
    fn test_classify_unknown_and_empty() {
        assert_eq!(ErrorKind::classify("segmentation fault"), ErrorKind::Unknown);
        assert_eq!(ErrorKind::classify(""), ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(
            ErrorKind::classify("TOO MANY REQUESTS"),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_transient_permanent_split() {
        assert!(ErrorKind::RateLimit.is_transient());
        assert!(ErrorKind::ConnectionError.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Unknown.is_transient());

        assert!(ErrorKind::QuotaExceeded.is_permanent());
        assert!(ErrorKind::UsageLimit.is_permanent());
        assert!(ErrorKind::ApiKeyInvalid.is_permanent());
    }

    #[test]
    fn test_is_limit_reply() {
        assert!(is_limit_reply("Your usage limit has been reached."));
        assert!(is_limit_reply("LIMIT REACHED: try again at 6pm"));
        assert!(!is_limit_reply("Here is the implementation you asked for."));
        assert!(!is_limit_reply(""));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
        assert_eq!(ErrorKind::ApiKeyInvalid.to_string(), "api_key_invalid");
    }
}
