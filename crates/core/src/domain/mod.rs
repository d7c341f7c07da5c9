pub mod deviation;
pub mod failure;
pub mod inventory;
pub mod overtime;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who did something, and when. Stored once per reached status
/// (`stamps["approved"]` is the approvedAt/approvedBy pair) and once as
/// the generic edited stamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub by: String,
}

impl Stamp {
    pub fn new(by: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { at, by: by.into() }
    }
}

/// Status-keyed stamp pairs. Keys are status storage strings.
pub type StampMap = BTreeMap<String, Stamp>;

/// A free-form note attached to an entity. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub added: Stamp,
}

/// Reference to an uploaded file; storage of the bytes is someone
/// else's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
    pub content_type: String,
    pub uploaded: Stamp,
}
