//! Resource-specific cleaning of fetched record sets.
//!
//! Each [`ResourceKind`] owns an ordered list of [`Step`]s. Steps only ever
//! drop rows or reshape fields; the single failure modes are unparseable
//! dates and tag lists that cannot be encoded.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::io;
use tracing::debug;

use crate::error::NormalizeError;
use crate::record::{record_id, Record, RecordSet, ResourceKind, DATE_FORMAT};

const LOCATION_FIELDS: [(&str, &str); 5] = [
    ("street", "loc_street"),
    ("city", "loc_city"),
    ("state", "loc_state"),
    ("country", "loc_country"),
    ("timezone", "loc_timezone"),
];

/// One cleaning rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep the first record seen for each id.
    Dedup,
    DropNullId,
    /// Require an owner and flatten `owner.id` into `ownerId`.
    ExtractOwner,
    /// Keep only records with a non-negative integer `likes`.
    DropNegativeLikes,
    /// Store the `tags` list as a JSON string.
    SerializeTags,
    /// Validate and canonicalize timestamp fields.
    ParseDates(&'static [&'static str]),
    /// Split the nested `location` object into `loc_*` columns.
    FlattenLocation,
    /// Drop every field the destination table does not declare.
    RetainColumns(&'static [&'static str]),
}

impl ResourceKind {
    /// Ordered cleaning rules for this kind.
    pub fn steps(&self) -> Vec<Step> {
        match self {
            Self::User => vec![
                Step::Dedup,
                Step::DropNullId,
                Step::FlattenLocation,
                Step::ParseDates(&["dateOfBirth", "registerDate", "updatedDate"]),
                Step::RetainColumns(self.output_columns()),
            ],
            Self::Post => vec![
                Step::Dedup,
                Step::DropNullId,
                Step::ExtractOwner,
                Step::DropNegativeLikes,
                Step::SerializeTags,
                Step::ParseDates(&["publishDate"]),
                Step::RetainColumns(self.output_columns()),
            ],
            Self::Comment => vec![
                Step::Dedup,
                Step::DropNullId,
                Step::ExtractOwner,
                Step::ParseDates(&["publishDate"]),
                Step::RetainColumns(self.output_columns()),
            ],
        }
    }
}

/// Clean a fetched record set into table-ready rows.
pub fn normalize(records: RecordSet, kind: ResourceKind) -> Result<RecordSet, NormalizeError> {
    let mut records = records;
    for step in kind.steps() {
        let before = records.len();
        records = step.apply(records)?;
        if records.len() != before {
            debug!(
                "{} {:?}: dropped {} of {} records",
                kind,
                step,
                before - records.len(),
                before
            );
        }
    }
    Ok(records)
}

impl Step {
    pub fn apply(&self, records: RecordSet) -> Result<RecordSet, NormalizeError> {
        match self {
            Step::Dedup => Ok(dedup(records)),
            Step::DropNullId => Ok(records
                .into_iter()
                .filter(|r| record_id(r).is_some())
                .collect()),
            Step::ExtractOwner => Ok(extract_owner(records)),
            Step::DropNegativeLikes => Ok(drop_negative_likes(records)),
            Step::SerializeTags => serialize_tags(records),
            Step::ParseDates(fields) => parse_dates(records, fields),
            Step::FlattenLocation => Ok(flatten_location(records)),
            Step::RetainColumns(columns) => Ok(retain_columns(records, columns)),
        }
    }
}

fn has_field(records: &RecordSet, field: &str) -> bool {
    records.iter().any(|r| r.contains_key(field))
}

fn id_for_error(record: &Record) -> String {
    record_id(record).unwrap_or_else(|| "<no id>".to_string())
}

fn dedup(records: RecordSet) -> RecordSet {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| match record_id(r) {
            Some(id) => seen.insert(id),
            // Null ids are removed by the next step.
            None => true,
        })
        .collect()
}

/// Every row must name its owner. A row that was already flattened keeps
/// its non-null `ownerId`.
fn extract_owner(records: RecordSet) -> RecordSet {
    records
        .into_iter()
        .filter_map(|mut record| {
            let owner_id = match record.shift_remove("owner") {
                Some(owner) => owner.get("id").filter(|id| !id.is_null())?.clone(),
                None => record.get("ownerId").filter(|id| !id.is_null())?.clone(),
            };
            record.insert("ownerId".to_string(), owner_id);
            Some(record)
        })
        .collect()
}

/// Integer value of `likes`, accepting whole numbers and numeric strings.
fn likes_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn drop_negative_likes(records: RecordSet) -> RecordSet {
    records
        .into_iter()
        .filter_map(|mut record| {
            let likes = record.get("likes").and_then(likes_value).filter(|n| *n >= 0)?;
            record.insert("likes".to_string(), Value::from(likes));
            Some(record)
        })
        .collect()
}

fn serialize_tags(records: RecordSet) -> Result<RecordSet, NormalizeError> {
    records
        .into_iter()
        .map(|mut record| {
            if let Some(tags @ Value::Array(_)) = record.get("tags") {
                let encoded = to_python_json(tags).map_err(|e| NormalizeError::TagEncoding {
                    id: id_for_error(&record),
                    reason: e.to_string(),
                })?;
                record.insert("tags".to_string(), Value::String(encoded));
            }
            Ok(record)
        })
        .collect()
}

fn parse_dates(records: RecordSet, fields: &[&str]) -> Result<RecordSet, NormalizeError> {
    records
        .into_iter()
        .map(|mut record| {
            for field in fields {
                let canonical = match record.get(*field) {
                    None | Some(Value::Null) => continue,
                    Some(Value::String(raw)) => NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT)
                        .map(|ts| ts.format(DATE_FORMAT).to_string())
                        .map_err(|_| raw.clone()),
                    Some(other) => Err(other.to_string()),
                };

                let canonical = canonical.map_err(|value| NormalizeError::InvalidDate {
                    field: field.to_string(),
                    id: id_for_error(&record),
                    value,
                })?;
                record.insert(field.to_string(), Value::String(canonical));
            }
            Ok(record)
        })
        .collect()
}

fn flatten_location(records: RecordSet) -> RecordSet {
    if !has_field(&records, "location") {
        return records;
    }

    records
        .into_iter()
        .map(|mut record| {
            let location = record.shift_remove("location").unwrap_or(Value::Null);
            for (key, column) in LOCATION_FIELDS {
                let value = location.get(key).cloned().unwrap_or(Value::Null);
                record.insert(column.to_string(), value);
            }
            record
        })
        .collect()
}

fn retain_columns(records: RecordSet, columns: &[&str]) -> RecordSet {
    records
        .into_iter()
        .map(|mut record| {
            columns
                .iter()
                .filter_map(|column| {
                    record
                        .shift_remove(*column)
                        .map(|value| (column.to_string(), value))
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// Python-compatible JSON encoding
// ============================================================================

/// Encode a value the way Python's `json.dumps` does by default: `", "` and
/// `": "` separators, and DEL plus every non-ASCII character escaped as
/// `\uXXXX`.
pub fn to_python_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PythonFormatter);
    value.serialize(&mut serializer)?;
    // Only ASCII was written.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

struct PythonFormatter;

impl serde_json::ser::Formatter for PythonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.bytes().all(|b| b < 0x7f) {
            return writer.write_all(fragment.as_bytes());
        }

        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch < '\x7f' {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> RecordSet {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn ids(records: &RecordSet) -> Vec<String> {
        records.iter().filter_map(record_id).collect()
    }

    fn raw_users() -> RecordSet {
        records(json!([
            {
                "id": "u1",
                "title": "ms",
                "firstName": "Sara",
                "lastName": "Andersen",
                "gender": "female",
                "email": "sara@example.com",
                "dateOfBirth": "1996-04-30 19:26:49",
                "registerDate": "2021-06-21 21:02:07",
                "updatedDate": "2021-06-21 21:02:07",
                "phone": "92694011",
                "picture": "https://randomuser.me/api/portraits/women/58.jpg",
                "location": {
                    "street": "9614, Søndermarksvej",
                    "city": "Kongsvinger",
                    "state": "Nordjylland",
                    "country": "Denmark",
                    "timezone": "-9:00"
                }
            },
            {
                "id": "u2",
                "firstName": "Edita",
                "dateOfBirth": null,
                "location": null
            }
        ]))
    }

    fn raw_posts() -> RecordSet {
        records(json!([
            {"id": "p1", "likes": 5, "tags": ["a", "b"], "text": "hello", "image": "x.jpg",
             "publishDate": "2020-05-24 14:53:17", "owner": {"id": "u1", "firstName": "Sara"}, "link": null},
            {"id": "p2", "likes": -3, "tags": [], "owner": {"id": "u1"}},
            {"id": "p3", "likes": 1, "owner": null},
            {"id": "p1", "likes": 99, "owner": {"id": "u2"}},
            {"id": null, "likes": 4, "owner": {"id": "u1"}},
            {"id": "p4", "likes": "7", "owner": {"id": "u2"}},
            {"id": "p5", "owner": {"id": "u2"}},
            {"id": "p6", "likes": 2, "owner": {"firstName": "nobody"}}
        ]))
    }

    fn raw_comments() -> RecordSet {
        records(json!([
            {"id": "c1", "message": "ok", "post": "p1", "owner": {"id": "u1"}, "publishDate": "2020-01-01 00:00:00"},
            {"id": "c2", "message": "orphan", "post": "p1", "owner": null},
            {"id": "c1", "message": "dup", "post": "p2", "owner": {"id": "u2"}},
            {"id": "c3", "message": "anonymous", "post": "p2"}
        ]))
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let out = normalize(raw_posts(), ResourceKind::Post).unwrap();
        let p1 = out.iter().find(|r| r["id"] == "p1").unwrap();
        assert_eq!(out.iter().filter(|r| r["id"] == "p1").count(), 1);
        assert_eq!(p1["likes"], 5);
        assert_eq!(p1["ownerId"], "u1");
    }

    #[test]
    fn test_post_rules() {
        let out = normalize(raw_posts(), ResourceKind::Post).unwrap();
        assert_eq!(ids(&out), vec!["p1", "p4"]);

        for record in &out {
            assert!(record["likes"].as_i64().unwrap() >= 0);
            assert!(!record["ownerId"].is_null());
            assert!(!record.contains_key("owner"));
            assert!(!record.contains_key("image"));
        }
        // Numeric strings are coerced.
        assert_eq!(out[1]["likes"], 7);
    }

    #[test]
    fn test_posts_without_likes_or_owner_dropped() {
        let input = records(json!([{"id": "p1", "text": "x"}, {"id": "p2", "text": "y", "tags": ["a"]}]));
        assert!(normalize(input, ResourceKind::Post).unwrap().is_empty());

        let input = records(json!([{"id": "p1", "owner": {"id": "u1"}}]));
        assert!(normalize(input, ResourceKind::Post).unwrap().is_empty());

        let input = records(json!([{"id": "p1", "likes": 3}]));
        assert!(normalize(input, ResourceKind::Post).unwrap().is_empty());
    }

    #[test]
    fn test_post_outcome_ignores_neighbours() {
        let lone = json!({"id": "p1", "owner": {"id": "u1"}});
        let kept = json!({"id": "p2", "likes": 1, "owner": {"id": "u1"}});

        let alone = normalize(records(json!([lone.clone()])), ResourceKind::Post).unwrap();
        let mixed = normalize(records(json!([lone, kept])), ResourceKind::Post).unwrap();
        assert!(alone.is_empty());
        assert_eq!(ids(&mixed), vec!["p2"]);
    }

    #[test]
    fn test_tags_encoded_like_python() {
        let out = normalize(raw_posts(), ResourceKind::Post).unwrap();
        assert_eq!(out[0]["tags"], r#"["a", "b"]"#);
        assert!(!out[1].contains_key("tags"));
    }

    #[test]
    fn test_python_json_escapes_non_ascii() {
        let encoded = to_python_json(&json!(["café", "日本", "😀"])).unwrap();
        assert_eq!(encoded, r#"["caf\u00e9", "\u65e5\u672c", "\ud83d\ude00"]"#);

        let encoded = to_python_json(&json!({"a": 1, "b": [true, null]})).unwrap();
        assert_eq!(encoded, r#"{"a": 1, "b": [true, null]}"#);

        let encoded = to_python_json(&json!(["a\u{7f}b", "tab\t"])).unwrap();
        assert_eq!(encoded, r#"["a\u007fb", "tab\t"]"#);
    }

    #[test]
    fn test_user_location_flattened() {
        let out = normalize(raw_users(), ResourceKind::User).unwrap();
        assert_eq!(out.len(), 2);

        let sara = &out[0];
        assert!(!sara.contains_key("location"));
        assert!(!sara.contains_key("gender"));
        assert!(!sara.contains_key("phone"));
        assert_eq!(sara["loc_city"], "Kongsvinger");
        assert_eq!(sara["loc_timezone"], "-9:00");
        assert_eq!(sara["dateOfBirth"], "1996-04-30 19:26:49");

        // A null location still produces the columns, all null.
        let edita = &out[1];
        assert!(edita["loc_street"].is_null());
        assert!(edita["dateOfBirth"].is_null());
    }

    #[test]
    fn test_no_location_column_means_no_loc_fields() {
        let input = records(json!([{"id": "u1", "firstName": "A"}]));
        let out = normalize(input, ResourceKind::User).unwrap();
        assert!(!out[0].contains_key("loc_city"));
    }

    #[test]
    fn test_output_follows_table_column_order() {
        let out = normalize(raw_users(), ResourceKind::User).unwrap();
        let keys: Vec<&str> = out[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ResourceKind::User.output_columns());
    }

    #[test]
    fn test_malformed_date_is_fatal() {
        let input = records(json!([
            {"id": "c1", "message": "hi", "owner": {"id": "u1"}, "publishDate": "2020-05-24T14:53:17.598Z"}
        ]));
        let err = normalize(input, ResourceKind::Comment).unwrap_err();
        match err {
            NormalizeError::InvalidDate { field, id, .. } => {
                assert_eq!(field, "publishDate");
                assert_eq!(id, "c1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_string_date_is_fatal() {
        let input = records(json!([{"id": "u1", "registerDate": 1620000000}]));
        assert!(normalize(input, ResourceKind::User).is_err());
    }

    #[test]
    fn test_comment_rules() {
        let out = normalize(raw_comments(), ResourceKind::Comment).unwrap();
        assert_eq!(ids(&out), vec!["c1"]);
        assert_eq!(out[0]["message"], "ok");
        assert_eq!(out[0]["post"], "p1");
        assert_eq!(out[0]["ownerId"], "u1");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for (kind, input) in [
            (ResourceKind::User, raw_users()),
            (ResourceKind::Post, raw_posts()),
            (ResourceKind::Comment, raw_comments()),
        ] {
            let once = normalize(input, kind).unwrap();
            let twice = normalize(once.clone(), kind).unwrap();
            assert_eq!(once, twice, "{kind} normalization is not idempotent");
        }
    }

    #[test]
    fn test_empty_input() {
        for kind in ResourceKind::ALL {
            assert!(normalize(Vec::new(), kind).unwrap().is_empty());
        }
    }
}
