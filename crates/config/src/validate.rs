//! Semantic checks on a loaded configuration.

use crate::schema::TeamsyncConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "bridge.renewal_lead_secs"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

#[must_use]
pub fn validate(config: &TeamsyncConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let bridge = &config.bridge;

    if bridge.bot_user_id.trim().is_empty() {
        result.push(
            Severity::Error,
            "bridge.bot_user_id",
            "bot user id is required to post forwarded messages and tag echoes",
        );
    }
    if bridge
        .remote_bot_user_id
        .as_deref()
        .is_none_or(|id| id.trim().is_empty())
    {
        result.push(
            Severity::Warning,
            "bridge.remote_bot_user_id",
            "without the remote bot id, forwarded posts are only recognized by their message mapping",
        );
    }
    if bridge.subscription_lifetime_secs == 0 {
        result.push(
            Severity::Error,
            "bridge.subscription_lifetime_secs",
            "subscription lifetime must be positive",
        );
    }
    if bridge.renewal_lead_secs >= bridge.subscription_lifetime_secs {
        result.push(
            Severity::Error,
            "bridge.renewal_lead_secs",
            format!(
                "renewal lead ({}s) must be shorter than the subscription lifetime ({}s)",
                bridge.renewal_lead_secs, bridge.subscription_lifetime_secs
            ),
        );
    }
    if bridge.remote_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "bridge.remote_timeout_secs",
            "remote calls need a positive deadline",
        );
    } else if bridge.remote_timeout_secs >= bridge.renewal_lead_secs {
        result.push(
            Severity::Warning,
            "bridge.remote_timeout_secs",
            "a renewal that runs into its deadline may complete after the subscription expired",
        );
    }
    if let Some(url) = bridge.callback_url.as_deref()
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        result.push(
            Severity::Error,
            "bridge.callback_url",
            format!("callback URL must be absolute: {url}"),
        );
    }
    if config.storage.database_url.is_none() {
        result.push(
            Severity::Warning,
            "storage.database_url",
            "no database configured; links and message mappings are lost on restart",
        );
    }

    result
}
