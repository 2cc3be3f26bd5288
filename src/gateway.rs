/// Remote mail gateway contract consumed by ingestion and the action executor
use async_trait::async_trait;
use std::fmt;

/// Label marking a message as unread on the provider side
pub const UNREAD_LABEL: &str = "UNREAD";

/// HTTP statuses worth retrying: rate limiting and server-side unavailability
const TRANSIENT_STATUSES: [u16; 3] = [429, 500, 503];

/// One page of the remote message listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Metadata returned by a detail fetch for a single message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDetail {
    pub headers: Vec<(String, String)>,
    pub snippet: Option<String>,
    pub internal_date_millis: Option<i64>,
    pub label_ids: Vec<String>,
}

impl MessageDetail {
    /// First header value with the given name (header names are case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Per-id results of a batched detail fetch, in request order
pub type BatchResponse = Vec<(String, Result<MessageDetail, GatewayError>)>;

/// Labels to add to and remove from a single message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelModification {
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

impl LabelModification {
    pub fn add<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelModification {
            add_label_ids: ids.into_iter().map(Into::into).collect(),
            remove_label_ids: Vec::new(),
        }
    }

    pub fn remove<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelModification {
            add_label_ids: Vec::new(),
            remove_label_ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for LabelModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "add=[{}] remove=[{}]",
            self.add_label_ids.join(","),
            self.remove_label_ids.join(",")
        )
    }
}

/// A label as known by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLabel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Rate limiting or temporary unavailability, safe to retry
    #[error("transient gateway failure (HTTP {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("gateway failure: {message}")]
    Permanent { status: Option<u16>, message: String },
}

impl GatewayError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if TRANSIENT_STATUSES.contains(&status) {
            GatewayError::Transient { status, message }
        } else {
            GatewayError::Permanent {
                status: Some(status),
                message,
            }
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        GatewayError::Permanent {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Transient { status, .. } => Some(*status),
            GatewayError::Permanent { status, .. } => *status,
        }
    }

    /// Failure class used in log lines
    pub fn class(&self) -> &'static str {
        match self {
            GatewayError::Transient { .. } => "transient",
            GatewayError::Permanent { .. } => "permanent",
        }
    }
}

/// Operations the core needs from the mail provider.
///
/// Only `modify_message` is retried by the core; listing, detail fetches and
/// label calls are attempted once.
#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn list_messages(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<MessagePage, GatewayError>;

    /// Fetch details for every id; a failing id does not fail the others
    async fn get_message_batch(&self, ids: &[String]) -> BatchResponse;

    async fn modify_message(
        &self,
        id: &str,
        modification: &LabelModification,
    ) -> Result<(), GatewayError>;

    async fn list_labels(&self) -> Result<Vec<RemoteLabel>, GatewayError>;

    async fn create_label(&self, name: &str) -> Result<RemoteLabel, GatewayError>;
}
