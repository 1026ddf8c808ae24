//! Record model shared by the fetcher, normalizer and loader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One API entity as an ordered field → value mapping.
pub type Record = serde_json::Map<String, Value>;

/// Ordered collection of records, in fetch order.
pub type RecordSet = Vec<Record>;

/// The only timestamp layout the API is trusted to produce.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The three resource types the pipeline moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    User,
    Post,
    Comment,
}

impl ResourceKind {
    /// All kinds in load order (parents before children).
    pub const ALL: [ResourceKind; 3] = [ResourceKind::User, ResourceKind::Post, ResourceKind::Comment];

    /// Destination table for this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Post => "posts",
            Self::Comment => "comments",
        }
    }

    /// Columns a normalized record of this kind may carry, in table order.
    pub fn output_columns(&self) -> &'static [&'static str] {
        match self {
            Self::User => &[
                "id",
                "title",
                "firstName",
                "lastName",
                "email",
                "picture",
                "dateOfBirth",
                "registerDate",
                "updatedDate",
                "loc_street",
                "loc_city",
                "loc_state",
                "loc_country",
                "loc_timezone",
            ],
            Self::Post => &[
                "id",
                "likes",
                "tags",
                "text",
                "publishDate",
                "ownerId",
                "link",
            ],
            Self::Comment => &["id", "message", "post", "publishDate", "ownerId"],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Post => "post",
            Self::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// String form of a record's `id`, or `None` when it is null or missing.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
