//! Envelope and payload validation.
//!
//! Validation never stops at the first problem: every violated constraint
//! is collected and reported together in `IngestError::Validation`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use fdm_core::error::IngestError;
use fdm_core::event::CloudEvent;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::category::EventCategory;
use super::payload::{
    CrmFields, DocumentFields, EventPayload, FileDescriptor, Keyed, MessageFields, PaymentFields,
};

/// Collects constraint violations with their field paths.
#[derive(Debug, Default)]
struct Violations {
    messages: Vec<String>,
}

impl Violations {
    fn push(&mut self, path: &str, message: &str) {
        self.messages.push(format!("\"{path}\" {message}"));
    }

    fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn into_error(self) -> IngestError {
        IngestError::Validation(self.messages)
    }
}

/// A JSON object being validated, plus the path prefix of its fields.
struct Fields<'a> {
    object: &'a Map<String, Value>,
    prefix: &'a str,
}

impl<'a> Fields<'a> {
    fn new(object: &'a Map<String, Value>, prefix: &'a str) -> Self {
        Self { object, prefix }
    }

    fn path(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{name}", self.prefix)
        }
    }

    /// The value at `name`, treating JSON `null` as absent.
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name).filter(|v| !v.is_null())
    }

    fn required_string(&self, name: &str, v: &mut Violations) -> Option<String> {
        match self.get(name) {
            None => {
                v.push(&self.path(name), "is required");
                None
            }
            Some(Value::String(s)) if s.is_empty() => {
                v.push(&self.path(name), "is not allowed to be empty");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                v.push(&self.path(name), "must be a string");
                None
            }
        }
    }

    /// An optional string; an empty string counts as absent.
    fn optional_string(&self, name: &str, v: &mut Violations) -> Option<String> {
        match self.get(name) {
            None => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                v.push(&self.path(name), "must be a string");
                None
            }
        }
    }

    fn required_guid(&self, name: &str, v: &mut Violations) -> Option<String> {
        let value = self.required_string(name, v)?;
        if Uuid::parse_str(&value).is_err() {
            v.push(&self.path(name), "must be a valid GUID");
            return None;
        }
        Some(value)
    }

    fn required_number(&self, name: &str, v: &mut Violations) -> Option<i64> {
        if self.get(name).is_none() {
            v.push(&self.path(name), "is required");
            return None;
        }
        self.optional_number(name, v)
    }

    /// An optional integer given as a JSON number or a numeric string. An
    /// empty string counts as absent.
    fn optional_number(&self, name: &str, v: &mut Violations) -> Option<i64> {
        let parsed = match self.get(name)? {
            Value::String(s) if s.is_empty() => return None,
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            v.push(&self.path(name), "must be a number");
        }
        parsed
    }

    fn required_positive(&self, name: &str, v: &mut Violations) -> Option<i64> {
        if self.get(name).is_none() {
            v.push(&self.path(name), "is required");
            return None;
        }
        self.optional_positive(name, v)
    }

    fn optional_positive(&self, name: &str, v: &mut Violations) -> Option<i64> {
        let value = self.optional_number(name, v)?;
        if value <= 0 {
            v.push(&self.path(name), "must be a positive number");
            return None;
        }
        Some(value)
    }

    fn required_object(&self, name: &str, v: &mut Violations) -> Option<&'a Map<String, Value>> {
        match self.get(name) {
            None => {
                v.push(&self.path(name), "is required");
                None
            }
            Some(Value::Object(object)) => Some(object),
            Some(_) => {
                v.push(&self.path(name), "must be of type object");
                None
            }
        }
    }

    fn optional_time(&self, name: &str, v: &mut Violations) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(time) => Some(time.with_timezone(&Utc)),
                Err(_) => {
                    v.push(&self.path(name), "must be in ISO 8601 date format");
                    None
                }
            },
            _ => {
                v.push(&self.path(name), "must be in ISO 8601 date format");
                None
            }
        }
    }
}

/// Validates the CloudEvents envelope and returns the typed event.
///
/// # Errors
///
/// Returns `IngestError::Validation` listing every missing or malformed
/// envelope field.
pub fn validate_envelope(raw: &Value) -> Result<CloudEvent, IngestError> {
    let Some(object) = raw.as_object() else {
        return Err(IngestError::Validation(vec![
            "\"value\" must be of type object".to_owned(),
        ]));
    };
    let fields = Fields::new(object, "");
    let mut v = Violations::default();

    let id = fields.required_guid("id", &mut v);
    let source = fields.required_string("source", &mut v);
    let event_type = fields.required_string("type", &mut v);
    let specversion = fields.required_string("specversion", &mut v);
    let datacontenttype = fields.optional_string("datacontenttype", &mut v);
    let subject = fields.optional_string("subject", &mut v);
    let time = fields.optional_time("time", &mut v);
    let data = fields.required_object("data", &mut v);

    match (id, source, event_type, specversion, data) {
        (Some(id), Some(source), Some(event_type), Some(specversion), Some(data))
            if v.is_empty() =>
        {
            Ok(CloudEvent {
                id,
                source,
                event_type,
                specversion,
                datacontenttype,
                time,
                subject,
                data: Value::Object(data.clone()),
            })
        }
        _ => Err(v.into_error()),
    }
}

/// Validates `event.data` against the schema of `category`.
///
/// # Errors
///
/// Returns `IngestError::Validation` listing every violated constraint.
pub fn validate_payload(
    category: EventCategory,
    event: &CloudEvent,
) -> Result<EventPayload, IngestError> {
    if category == EventCategory::MessageRejected {
        return Ok(EventPayload::MessageRejected);
    }

    let Some(data) = event.data.as_object() else {
        return Err(IngestError::Validation(vec![
            "\"data\" must be of type object".to_owned(),
        ]));
    };
    let fields = Fields::new(data, "data");
    let mut v = Violations::default();

    let payload = match category {
        EventCategory::Message => message_payload(&fields, &mut v).map(EventPayload::Message),
        EventCategory::Document => document_payload(&fields, &mut v).map(EventPayload::Document),
        EventCategory::Crm => crm_payload(&fields, &mut v).map(EventPayload::Crm),
        EventCategory::Payment => payment_payload(&fields, &mut v).map(EventPayload::Payment),
        EventCategory::MessageRejected => Some(EventPayload::MessageRejected),
    };

    match payload {
        Some(payload) if v.is_empty() => Ok(payload),
        _ => Err(v.into_error()),
    }
}

fn message_payload(fields: &Fields<'_>, v: &mut Violations) -> Option<Keyed<MessageFields>> {
    let correlation_id = fields.required_string("correlationId", v);
    let recipient = fields.required_string("recipient", v);
    let subject = fields.optional_string("subject", v);
    let body = fields.optional_string("body", v);
    let crn = fields.optional_number("crn", v);
    let sbi = fields.optional_number("sbi", v);

    let correlation_id = correlation_id?;
    Some(Keyed {
        key: correlation_id.clone(),
        fields: MessageFields {
            correlation_id: Some(correlation_id),
            crn,
            sbi,
            recipient: Some(recipient?),
            subject,
            body,
        },
    })
}

fn document_payload(fields: &Fields<'_>, v: &mut Violations) -> Option<Keyed<DocumentFields>> {
    let correlation_id = fields.required_string("correlationId", v);
    let crn = fields.required_number("crn", v);
    let sbi = fields.required_number("sbi", v);
    let file = fields.required_object("file", v).and_then(|object| {
        let path = fields.path("file");
        let file = Fields::new(object, &path);
        let file_id = file.required_string("fileId", v);
        let file_name = file.required_string("fileName", v);
        let content_type = file.required_string("contentType", v);
        let url = file.required_string("url", v);
        Some(FileDescriptor {
            file_id: file_id?,
            file_name: file_name?,
            content_type: content_type?,
            url: url?,
        })
    });

    let (correlation_id, file) = (correlation_id?, file?);
    Some(Keyed {
        key: format!("{correlation_id}:{}", file.file_id),
        fields: DocumentFields {
            correlation_id: Some(correlation_id),
            crn,
            sbi,
            file_id: Some(file.file_id.clone()),
            file_name: Some(file.file_name.clone()),
            file: Some(file),
        },
    })
}

fn crm_payload(fields: &Fields<'_>, v: &mut Violations) -> Option<Keyed<CrmFields>> {
    let correlation_id = fields.required_string("correlationId", v);
    let crn = fields.required_number("crn", v);
    let sbi = fields.required_number("sbi", v);
    let case_id = fields.required_string("caseId", v);
    let case_type = fields.required_string("caseType", v);
    let file_ids = submission_file_ids(fields, v);

    let (correlation_id, case_id) = (correlation_id?, case_id?);
    Some(Keyed {
        key: format!("{correlation_id}:{case_id}"),
        fields: CrmFields {
            correlation_id: Some(correlation_id),
            crn,
            sbi,
            case_id: Some(case_id),
            case_type,
            file_ids,
        },
    })
}

/// File ids referenced by `onlineSubmissionActivities`, if any.
fn submission_file_ids(fields: &Fields<'_>, v: &mut Violations) -> BTreeSet<String> {
    const NAME: &str = "onlineSubmissionActivities";
    match fields.get(NAME) {
        None => BTreeSet::new(),
        Some(Value::Array(activities)) => activities
            .iter()
            .filter_map(|activity| activity.get("fileId").and_then(Value::as_str))
            .filter(|file_id| !file_id.is_empty())
            .map(str::to_owned)
            .collect(),
        Some(_) => {
            v.push(&fields.path(NAME), "must be an array");
            BTreeSet::new()
        }
    }
}

fn payment_payload(fields: &Fields<'_>, v: &mut Violations) -> Option<Keyed<PaymentFields>> {
    let frn = fields.optional_positive("frn", v);
    let sbi = fields.optional_positive("sbi", v);
    let trader = fields.optional_string("trader", v);
    let vendor = fields.optional_string("vendor", v);
    let correlation_id = fields.required_guid("correlationId", v);
    let scheme_id = fields.required_positive("schemeId", v);
    let invoice_number = fields.required_string("invoiceNumber", v);

    if frn.is_none() && sbi.is_none() && trader.is_none() && vendor.is_none() {
        v.push("data", "No customer identifier has been provided");
    }

    let correlation_id = correlation_id?;
    Some(Keyed {
        key: correlation_id.clone(),
        fields: PaymentFields {
            correlation_id: Some(correlation_id),
            frn,
            sbi,
            trader,
            vendor,
            scheme_id: Some(scheme_id?),
            invoice_number: Some(invoice_number?),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, data: Value) -> Value {
        json!({
            "id": "79389915-7275-457a-b8ca-8bf206b2e67b",
            "source": "fcp-sfd-comms",
            "type": event_type,
            "specversion": "1.0",
            "datacontenttype": "application/json",
            "time": "2023-10-17T14:48:00.000Z",
            "data": data
        })
    }

    fn violations(result: Result<impl std::fmt::Debug, IngestError>) -> Vec<String> {
        match result {
            Err(IngestError::Validation(messages)) => messages,
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_envelope_is_accepted() {
        let raw = envelope("uk.gov.fcp.sfd.notification.delivered", json!({}));

        let event = validate_envelope(&raw).unwrap();

        assert_eq!(event.id, "79389915-7275-457a-b8ca-8bf206b2e67b");
        assert_eq!(event.event_type, "uk.gov.fcp.sfd.notification.delivered");
        assert!(event.time.is_some());
    }

    #[test]
    fn test_envelope_reports_every_violation() {
        let raw = json!({ "id": "not-a-guid", "type": "", "time": "yesterday" });

        let messages = violations(validate_envelope(&raw));

        assert_eq!(
            messages,
            vec![
                "\"id\" must be a valid GUID",
                "\"source\" is required",
                "\"type\" is not allowed to be empty",
                "\"specversion\" is required",
                "\"time\" must be in ISO 8601 date format",
                "\"data\" is required",
            ]
        );
    }

    #[test]
    fn test_envelope_without_time_is_accepted() {
        let mut raw = envelope("uk.gov.fcp.sfd.crm.case.created", json!({}));
        raw.as_object_mut().unwrap().remove("time");

        let event = validate_envelope(&raw).unwrap();

        assert!(event.time.is_none());
    }

    #[test]
    fn test_non_object_envelope_is_rejected() {
        let messages = violations(validate_envelope(&json!("text")));

        assert_eq!(messages, vec!["\"value\" must be of type object"]);
    }

    #[test]
    fn test_message_payload_requires_correlation_id_and_recipient() {
        let event = validate_envelope(&envelope(
            "uk.gov.fcp.sfd.notification.sending",
            json!({ "subject": "Hi" }),
        ))
        .unwrap();

        let messages = violations(validate_payload(EventCategory::Message, &event));

        assert_eq!(
            messages,
            vec![
                "\"data.correlationId\" is required",
                "\"data.recipient\" is required",
            ]
        );
    }

    #[test]
    fn test_message_payload_keys_by_correlation_id() {
        let event = validate_envelope(&envelope(
            "uk.gov.fcp.sfd.notification.request",
            json!({ "correlationId": "c1", "recipient": "a@b.com", "body": "Hello", "crn": "1234567890" }),
        ))
        .unwrap();

        let payload = validate_payload(EventCategory::Message, &event).unwrap();

        match payload {
            EventPayload::Message(keyed) => {
                assert_eq!(keyed.key, "c1");
                assert_eq!(keyed.fields.recipient.as_deref(), Some("a@b.com"));
                assert_eq!(keyed.fields.body.as_deref(), Some("Hello"));
                assert_eq!(keyed.fields.crn, Some(1_234_567_890));
                assert!(keyed.fields.subject.is_none());
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_document_payload_reports_nested_file_paths() {
        let event = validate_envelope(&envelope(
            "uk.gov.fcp.sfd.document.uploaded",
            json!({ "correlationId": "c1", "crn": 1, "sbi": 2, "file": { "fileId": "f1" } }),
        ))
        .unwrap();

        let messages = violations(validate_payload(EventCategory::Document, &event));

        assert_eq!(
            messages,
            vec![
                "\"data.file.fileName\" is required",
                "\"data.file.contentType\" is required",
                "\"data.file.url\" is required",
            ]
        );
    }

    #[test]
    fn test_document_payload_keys_by_correlation_and_file() {
        let event = validate_envelope(&envelope(
            "uk.gov.fcp.sfd.document.uploaded",
            json!({
                "correlationId": "c1",
                "crn": 1_050_000_000,
                "sbi": 105_000_000,
                "file": { "fileId": "f1", "fileName": "a.pdf", "contentType": "application/pdf", "url": "s3://bucket/a.pdf" }
            }),
        ))
        .unwrap();

        let payload = validate_payload(EventCategory::Document, &event).unwrap();

        match payload {
            EventPayload::Document(keyed) => {
                assert_eq!(keyed.key, "c1:f1");
                assert_eq!(keyed.fields.file_name.as_deref(), Some("a.pdf"));
                assert_eq!(keyed.fields.file.unwrap().url, "s3://bucket/a.pdf");
            }
            other => panic!("expected Document, got {other:?}"),
        }
    }

    #[test]
    fn test_crm_payload_collects_submission_file_ids() {
        let event = validate_envelope(&envelope(
            "uk.gov.fcp.sfd.crm.case.created",
            json!({
                "correlationId": "c1",
                "crn": 1,
                "sbi": 2,
                "caseId": "case-1",
                "caseType": "DOCUMENT_UPLOAD",
                "onlineSubmissionActivities": [{ "fileId": "f2" }, { "other": true }, { "fileId": "f1" }]
            }),
        ))
        .unwrap();

        let payload = validate_payload(EventCategory::Crm, &event).unwrap();

        match payload {
            EventPayload::Crm(keyed) => {
                assert_eq!(keyed.key, "c1:case-1");
                assert_eq!(
                    keyed.fields.file_ids.into_iter().collect::<Vec<_>>(),
                    vec!["f1", "f2"]
                );
            }
            other => panic!("expected Crm, got {other:?}"),
        }
    }

    #[test]
    fn test_payment_requires_a_customer_identifier() {
        let event = validate_envelope(&envelope(
            "uk.gov.defra.ffc.pay.payment.processed",
            json!({
                "correlationId": "a0b1c2d3-e4f5-4a6b-8c7d-9e0f1a2b3c4d",
                "schemeId": 1,
                "invoiceNumber": "INV-1",
                "frn": "",
                "trader": null
            }),
        ))
        .unwrap();

        let messages = violations(validate_payload(EventCategory::Payment, &event));

        assert_eq!(
            messages,
            vec!["\"data\" No customer identifier has been provided"]
        );
    }

    #[test]
    fn test_payment_accepts_any_single_identifier() {
        let event = validate_envelope(&envelope(
            "uk.gov.defra.ffc.pay.payment.processed",
            json!({
                "correlationId": "a0b1c2d3-e4f5-4a6b-8c7d-9e0f1a2b3c4d",
                "schemeId": 1,
                "invoiceNumber": "INV-1",
                "vendor": "V1"
            }),
        ))
        .unwrap();

        let payload = validate_payload(EventCategory::Payment, &event).unwrap();

        assert_eq!(payload.category(), EventCategory::Payment);
    }

    #[test]
    fn test_payment_rejects_bad_guid_and_non_positive_numbers() {
        let event = validate_envelope(&envelope(
            "uk.gov.defra.ffc.pay.payment.processed",
            json!({
                "correlationId": "abc",
                "schemeId": 0,
                "invoiceNumber": "INV-1",
                "frn": -5,
                "sbi": 123
            }),
        ))
        .unwrap();

        let messages = violations(validate_payload(EventCategory::Payment, &event));

        assert_eq!(
            messages,
            vec![
                "\"data.frn\" must be a positive number",
                "\"data.correlationId\" must be a valid GUID",
                "\"data.schemeId\" must be a positive number",
            ]
        );
    }

    #[test]
    fn test_rejected_messages_need_no_payload_fields() {
        let event = validate_envelope(&envelope(
            "uk.gov.fcp.sfd.notification.failure.validation",
            json!({}),
        ))
        .unwrap();

        let payload = validate_payload(EventCategory::MessageRejected, &event).unwrap();

        assert_eq!(payload, EventPayload::MessageRejected);
    }
}
