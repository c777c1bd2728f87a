//! Event classification by `type` prefix.

use std::fmt;

use fdm_core::error::IngestError;

/// Exact type of a message rejected by the notification service's own
/// validation. Checked before the general notification prefix.
pub const MESSAGE_REJECTED_TYPE: &str = "uk.gov.fcp.sfd.notification.failure.validation";
/// Prefix of message lifecycle events.
pub const MESSAGE_PREFIX: &str = "uk.gov.fcp.sfd.notification.";
/// Prefix of document upload events.
pub const DOCUMENT_PREFIX: &str = "uk.gov.fcp.sfd.document.";
/// Prefix of CRM case events.
pub const CRM_PREFIX: &str = "uk.gov.fcp.sfd.crm.";
/// Prefix of payment events.
pub const PAYMENT_PREFIX: &str = "uk.gov.defra.ffc.pay.payment.";

/// The fixed set of event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Message lifecycle.
    Message,
    /// Message rejected before sending; logged but not projected.
    MessageRejected,
    /// Document upload.
    Document,
    /// CRM case.
    Crm,
    /// Payment.
    Payment,
}

impl EventCategory {
    /// Prefix whose remainder is the status of events in this category.
    #[must_use]
    pub fn type_prefix(self) -> &'static str {
        match self {
            Self::Message | Self::MessageRejected => MESSAGE_PREFIX,
            Self::Document => DOCUMENT_PREFIX,
            Self::Crm => CRM_PREFIX,
            Self::Payment => PAYMENT_PREFIX,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::MessageRejected => "messageRejected",
            Self::Document => "document",
            Self::Crm => "crm",
            Self::Payment => "payment",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Rule {
    fn matches(self, event_type: &str) -> bool {
        match self {
            Self::Exact(expected) => event_type == expected,
            Self::Prefix(prefix) => event_type.starts_with(prefix),
        }
    }
}

/// Ordered classification table. First match wins.
const RULES: [(Rule, EventCategory); 5] = [
    (Rule::Exact(MESSAGE_REJECTED_TYPE), EventCategory::MessageRejected),
    (Rule::Prefix(MESSAGE_PREFIX), EventCategory::Message),
    (Rule::Prefix(DOCUMENT_PREFIX), EventCategory::Document),
    (Rule::Prefix(CRM_PREFIX), EventCategory::Crm),
    (Rule::Prefix(PAYMENT_PREFIX), EventCategory::Payment),
];

/// Maps an event `type` to its category.
///
/// # Errors
///
/// Returns `IngestError::UnknownEventType` if no rule matches.
pub fn classify(event_type: &str) -> Result<EventCategory, IngestError> {
    RULES
        .iter()
        .find(|(rule, _)| rule.matches(event_type))
        .map(|(_, category)| *category)
        .ok_or_else(|| IngestError::UnknownEventType(event_type.to_owned()))
}

/// The status encoded in `event_type` after `prefix`, or `None` when the
/// type does not carry the prefix.
#[must_use]
pub fn status_from_type(event_type: &str, prefix: &str) -> Option<String> {
    event_type.strip_prefix(prefix).map(str::to_owned)
}
