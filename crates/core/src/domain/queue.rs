// Queue Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Queue identifier (logical base name, e.g. "mailer")
pub type QueueId = String;

/// Default visibility timeout (10 minutes)
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u32 = 600;

/// Default message retention (14 days)
pub const DEFAULT_RETENTION_PERIOD_SECS: u32 = 14 * 24 * 60 * 60;

/// Default delivery delay
pub const DEFAULT_DELAY_SECONDS: u32 = 0;

/// Default failed deliveries before a message is dead-lettered
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 1;

/// Suffix appended to a main queue's base name to name its dead-letter queue
pub const DEAD_QUEUE_NAMESPACE: &str = "dead_queue";

/// Join the non-blank parts of a queue name with `_`.
///
/// `None` and empty strings are skipped, so there are never double separators:
///
/// ```
/// use quiver_core::domain::queue::resolve_full_name;
///
/// assert_eq!(resolve_full_name("jobs", None, None), "jobs");
/// assert_eq!(resolve_full_name("jobs", Some("prod"), Some("v1")), "prod_jobs_v1");
/// assert_eq!(resolve_full_name("jobs", Some(""), Some("v1")), "jobs_v1");
/// ```
pub fn resolve_full_name(base_name: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
    [prefix, Some(base_name), suffix]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Broker-side queue attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttributes {
    pub visibility_timeout_secs: u32,
    pub retention_period_secs: u32,
    pub delay_seconds: u32,
    pub max_receive_count: u32,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: DEFAULT_VISIBILITY_TIMEOUT_SECS,
            retention_period_secs: DEFAULT_RETENTION_PERIOD_SECS,
            delay_seconds: DEFAULT_DELAY_SECONDS,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }
}

impl QueueAttributes {
    /// Attributes used for dead-letter queues (1 hour visibility)
    pub fn dead_letter() -> Self {
        Self {
            visibility_timeout_secs: 60 * 60,
            ..Self::default()
        }
    }

    /// Attribute map in the broker's `CreateQueue` vocabulary
    pub fn to_create_attributes(&self) -> Vec<(String, String)> {
        vec![
            (
                "VisibilityTimeout".to_string(),
                self.visibility_timeout_secs.to_string(),
            ),
            (
                "MessageRetentionPeriod".to_string(),
                self.retention_period_secs.to_string(),
            ),
            ("DelaySeconds".to_string(), self.delay_seconds.to_string()),
        ]
    }
}

/// Environment-wide naming applied around every base name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueNaming {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl QueueNaming {
    pub fn new(prefix: Option<String>, suffix: Option<String>) -> Self {
        Self { prefix, suffix }
    }

    pub fn full_name(&self, base_name: &str) -> String {
        resolve_full_name(base_name, self.prefix.as_deref(), self.suffix.as_deref())
    }
}

/// Queue configuration, resolved once from a logical name
///
/// `full_name` is derived from the naming at construction and never changes
/// afterwards. URL and ARN are resolved lazily by `application::queue::Queue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    base_name: QueueId,
    naming: QueueNaming,
    full_name: String,
    url: Option<String>,
    pub attributes: QueueAttributes,
}

impl QueueConfig {
    /// Create a queue config with no prefix or suffix
    pub fn new(base_name: impl Into<String>) -> Result<Self> {
        Self::with_naming(base_name, QueueNaming::default())
    }

    /// Create a queue config under an environment naming scheme
    pub fn with_naming(base_name: impl Into<String>, naming: QueueNaming) -> Result<Self> {
        let base_name = base_name.into();
        validate_base_name(&base_name)?;

        let full_name = naming.full_name(&base_name);
        Ok(Self {
            base_name,
            naming,
            full_name,
            url: None,
            attributes: QueueAttributes::default(),
        })
    }

    /// Derive a sibling queue named `<base>_<namespace>`
    ///
    /// The namespace inherits naming and attributes but never an explicit URL.
    pub fn namespace(&self, namespace: &str) -> Result<Self> {
        let base_name = resolve_full_name(&self.base_name, None, Some(namespace));
        let mut config = Self::with_naming(base_name, self.naming.clone())?;
        config.attributes = self.attributes;
        Ok(config)
    }

    /// Config for this queue's dead-letter partner
    pub fn dead_letter(&self) -> Result<Self> {
        let mut config = self.namespace(DEAD_QUEUE_NAMESPACE)?;
        config.attributes = QueueAttributes::dead_letter();
        Ok(config)
    }

    /// Pin the queue URL instead of looking it up on the broker
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    pub fn with_visibility_timeout(mut self, secs: u32) -> Self {
        self.attributes.visibility_timeout_secs = secs;
        self
    }

    pub fn with_retention_period(mut self, secs: u32) -> Self {
        self.attributes.retention_period_secs = secs;
        self
    }

    pub fn with_delay_seconds(mut self, secs: u32) -> Self {
        self.attributes.delay_seconds = secs;
        self
    }

    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.attributes.max_receive_count = count.max(1);
        self
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn explicit_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn visibility_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.attributes.visibility_timeout_secs))
    }
}

fn validate_base_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidQueueName(
            "queue name cannot be empty".to_string(),
        ));
    }
    // Broker limit is 80 characters for the full name; base names get a margin.
    if trimmed.len() > 64 {
        return Err(DomainError::InvalidQueueName(format!(
            "queue name too long: {}",
            trimmed
        )));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DomainError::InvalidQueueName(format!(
            "queue name must be alphanumeric, '_' or '-': {}",
            trimmed
        )));
    }
    Ok(())
}

/// Broker redrive policy (main queue -> dead-letter target)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrivePolicy {
    pub max_receive_count: u32,
    pub dead_letter_target_arn: String,
}

impl RedrivePolicy {
    /// JSON document for the `RedrivePolicy` attribute
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "maxReceiveCount": self.max_receive_count.to_string(),
            "deadLetterTargetArn": self.dead_letter_target_arn,
        })
        .to_string()
    }

    /// Parse a `RedrivePolicy` attribute; the count may be a string or a number
    pub fn parse(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let max_receive_count = match value.get("maxReceiveCount")? {
            serde_json::Value::String(s) => s.parse().ok()?,
            serde_json::Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
            _ => return None,
        };
        let dead_letter_target_arn = value.get("deadLetterTargetArn")?.as_str()?.to_string();
        Some(Self {
            max_receive_count,
            dead_letter_target_arn,
        })
    }
}

/// Pairing of a main queue with its dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterLink {
    pub main_queue: QueueId,
    pub dead_queue: QueueId,
    pub max_receive_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_skips_blank_parts() {
        assert_eq!(resolve_full_name("jobs", None, None), "jobs");
        assert_eq!(
            resolve_full_name("jobs", Some("prod"), Some("v1")),
            "prod_jobs_v1"
        );
        assert_eq!(resolve_full_name("jobs", Some(" "), None), "jobs");
        assert_eq!(resolve_full_name("jobs", None, Some("final")), "jobs_final");
    }

    #[test]
    fn test_defaults() {
        let config = QueueConfig::new("mailer").unwrap();
        assert_eq!(config.full_name(), "mailer");
        assert_eq!(config.attributes.visibility_timeout_secs, 600);
        assert_eq!(config.attributes.retention_period_secs, 1_209_600);
        assert_eq!(config.attributes.delay_seconds, 0);
        assert_eq!(config.attributes.max_receive_count, 1);
        assert!(config.explicit_url().is_none());
    }

    #[test]
    fn test_namespace_inherits_naming() {
        let naming = QueueNaming::new(Some("environment".into()), None);
        let config = QueueConfig::with_naming("scheduler_example", naming)
            .unwrap()
            .with_visibility_timeout(30);

        let inner = config.namespace("inner").unwrap();
        assert_eq!(inner.base_name(), "scheduler_example_inner");
        assert_eq!(inner.full_name(), "environment_scheduler_example_inner");
        assert_eq!(inner.attributes.visibility_timeout_secs, 30);
    }

    #[test]
    fn test_dead_letter_config() {
        let naming = QueueNaming::new(Some("prod".into()), Some("v1".into()));
        let config = QueueConfig::with_naming("jobs", naming)
            .unwrap()
            .with_max_receive_count(3);

        let dead = config.dead_letter().unwrap();
        assert_eq!(dead.full_name(), "prod_jobs_dead_queue_v1");
        assert_eq!(dead.attributes.visibility_timeout_secs, 3600);
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(
            QueueConfig::new(""),
            Err(DomainError::InvalidQueueName(_))
        ));
        assert!(matches!(
            QueueConfig::new("bad name!"),
            Err(DomainError::InvalidQueueName(_))
        ));
        assert!(QueueConfig::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_blank_url_is_ignored() {
        let config = QueueConfig::new("jobs").unwrap().with_url("  ");
        assert!(config.explicit_url().is_none());

        let config = QueueConfig::new("jobs").unwrap().with_url("http://host/jobs");
        assert_eq!(config.explicit_url(), Some("http://host/jobs"));
    }

    #[test]
    fn test_redrive_policy_json() {
        let policy = RedrivePolicy {
            max_receive_count: 2,
            dead_letter_target_arn: "arn:aws:sqs:us-east-1:000000000000:jobs_dead_queue"
                .to_string(),
        };
        let parsed = RedrivePolicy::parse(&policy.to_json()).unwrap();
        assert_eq!(parsed, policy);

        let numeric =
            RedrivePolicy::parse(r#"{"maxReceiveCount":5,"deadLetterTargetArn":"arn:x"}"#)
                .unwrap();
        assert_eq!(numeric.max_receive_count, 5);
        assert!(RedrivePolicy::parse("not json").is_none());
    }
}
