//! Read-side query parameters and document shaping for projection lookups.
//! The external query API consumes these; no route in this service does.

use crate::projection::Collection;

/// Default number of documents per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Filter and paging for listing projection documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Customer reference number filter.
    pub crn: Option<i64>,
    /// Single business identifier filter.
    pub sbi: Option<i64>,
    /// 1-based page number.
    pub page: u32,
    /// Documents per page.
    pub page_size: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            crn: None,
            sbi: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListQuery {
    /// Number of documents to skip for the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }
}

/// Optional parts of a projection document returned to readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Include the `events` audit trail.
    pub include_events: bool,
    /// Include category content fields.
    pub include_content: bool,
}

/// Content fields hidden unless `include_content` is requested.
fn content_fields(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Messages => &["recipient", "subject", "body"],
        Collection::Documents => &["file"],
        Collection::Events | Collection::Crm | Collection::Payments => &[],
    }
}

/// Removes the parts of `document` a reader did not ask for.
#[must_use]
pub fn shape_document(
    collection: Collection,
    mut document: serde_json::Value,
    options: ViewOptions,
) -> serde_json::Value {
    if let Some(object) = document.as_object_mut() {
        if !options.include_events {
            object.remove("events");
        }
        if !options.include_content {
            for field in content_fields(collection) {
                object.remove(*field);
            }
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offset_is_zero_for_first_page() {
        let query = ListQuery::default();

        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_offset_skips_previous_pages() {
        let query = ListQuery {
            page: 3,
            page_size: 15,
            ..ListQuery::default()
        };

        assert_eq!(query.offset(), 30);
    }

    #[test]
    fn test_page_zero_is_treated_as_first_page() {
        let query = ListQuery {
            page: 0,
            ..ListQuery::default()
        };

        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_shape_document_strips_events_and_content_by_default() {
        let doc = json!({
            "id": "c1",
            "status": "delivered",
            "recipient": "a@b.com",
            "body": "hello",
            "events": [{ "id": "1" }]
        });

        let shaped = shape_document(Collection::Messages, doc, ViewOptions::default());

        assert_eq!(shaped, json!({ "id": "c1", "status": "delivered" }));
    }

    #[test]
    fn test_shape_document_keeps_requested_parts() {
        let doc = json!({ "id": "c1:f1", "file": { "url": "s3://x" }, "events": [] });
        let options = ViewOptions {
            include_events: true,
            include_content: true,
        };

        let shaped = shape_document(Collection::Documents, doc.clone(), options);

        assert_eq!(shaped, doc);
    }
}
