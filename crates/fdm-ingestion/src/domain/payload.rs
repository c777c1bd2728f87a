//! Typed, validated event payloads and the projection fields they carry.

use std::collections::BTreeSet;

use fdm_core::projection::{Collection, ProjectionFields};
use serde::{Deserialize, Serialize};

use super::category::EventCategory;

fn overlay<T: Clone>(current: &mut Option<T>, incoming: Option<&T>) {
    if let Some(value) = incoming {
        *current = Some(value.clone());
    }
}

/// Fields of a message lifecycle aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crn: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ProjectionFields for MessageFields {
    fn overlay(&mut self, incoming: &Self) {
        overlay(&mut self.correlation_id, incoming.correlation_id.as_ref());
        overlay(&mut self.crn, incoming.crn.as_ref());
        overlay(&mut self.sbi, incoming.sbi.as_ref());
        overlay(&mut self.recipient, incoming.recipient.as_ref());
        overlay(&mut self.subject, incoming.subject.as_ref());
        overlay(&mut self.body, incoming.body.as_ref());
    }
}

/// Descriptor of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_name: String,
    pub content_type: String,
    pub url: String,
}

/// Fields of a document upload aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crn: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
}

impl ProjectionFields for DocumentFields {
    fn overlay(&mut self, incoming: &Self) {
        overlay(&mut self.correlation_id, incoming.correlation_id.as_ref());
        overlay(&mut self.crn, incoming.crn.as_ref());
        overlay(&mut self.sbi, incoming.sbi.as_ref());
        overlay(&mut self.file_id, incoming.file_id.as_ref());
        overlay(&mut self.file_name, incoming.file_name.as_ref());
        overlay(&mut self.file, incoming.file.as_ref());
    }
}

/// Fields of a CRM case aggregate.
///
/// `file_ids` is excluded from `overlay`; it only ever grows through the
/// union stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrmFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crn: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    pub file_ids: BTreeSet<String>,
}

impl ProjectionFields for CrmFields {
    fn overlay(&mut self, incoming: &Self) {
        overlay(&mut self.correlation_id, incoming.correlation_id.as_ref());
        overlay(&mut self.crn, incoming.crn.as_ref());
        overlay(&mut self.sbi, incoming.sbi.as_ref());
        overlay(&mut self.case_id, incoming.case_id.as_ref());
        overlay(&mut self.case_type, incoming.case_type.as_ref());
    }
}

/// Fields of a payment aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frn: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
}

impl ProjectionFields for PaymentFields {
    fn overlay(&mut self, incoming: &Self) {
        overlay(&mut self.correlation_id, incoming.correlation_id.as_ref());
        overlay(&mut self.frn, incoming.frn.as_ref());
        overlay(&mut self.sbi, incoming.sbi.as_ref());
        overlay(&mut self.trader, incoming.trader.as_ref());
        overlay(&mut self.vendor, incoming.vendor.as_ref());
        overlay(&mut self.scheme_id, incoming.scheme_id.as_ref());
        overlay(&mut self.invoice_number, incoming.invoice_number.as_ref());
    }
}

/// Validated payload addressed to one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<F> {
    /// Business key of the target aggregate.
    pub key: String,
    /// Fields extracted from `data`.
    pub fields: F,
}

/// A validated event payload, one variant per category.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Message(Keyed<MessageFields>),
    MessageRejected,
    Document(Keyed<DocumentFields>),
    Crm(Keyed<CrmFields>),
    Payment(Keyed<PaymentFields>),
}

impl EventPayload {
    /// Category this payload belongs to.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Message(_) => EventCategory::Message,
            Self::MessageRejected => EventCategory::MessageRejected,
            Self::Document(_) => EventCategory::Document,
            Self::Crm(_) => EventCategory::Crm,
            Self::Payment(_) => EventCategory::Payment,
        }
    }

    /// Target collection, or `None` for payloads that are not projected.
    #[must_use]
    pub fn collection(&self) -> Option<Collection> {
        match self {
            Self::Message(_) => Some(Collection::Messages),
            Self::MessageRejected => None,
            Self::Document(_) => Some(Collection::Documents),
            Self::Crm(_) => Some(Collection::Crm),
            Self::Payment(_) => Some(Collection::Payments),
        }
    }
}
