//! Attachment metadata normalization
//!
//! Upload paths disagree on field names (`filename` vs `name`, `mimeType` vs
//! `contentType`, ...). The first name in each pair wins.

use crate::models::{LocalAttachment, WireAttachment};

/// Map local attachment records to the wire shape, preserving order
pub fn map_attachments(attachments: &[LocalAttachment]) -> Vec<WireAttachment> {
    attachments.iter().map(to_wire).collect()
}

fn to_wire(local: &LocalAttachment) -> WireAttachment {
    WireAttachment {
        file_id: local.file_id.clone(),
        url: local.url.clone(),
        storage_key: first(&local.storage_key, &local.key),
        name: first(&local.filename, &local.name),
        content_type: first(&local.mime_type, &local.content_type),
        size: local.size_bytes.or(local.size),
        provider: local.provider.clone(),
    }
}

fn first(preferred: &Option<String>, fallback: &Option<String>) -> Option<String> {
    preferred.clone().or_else(|| fallback.clone())
}
