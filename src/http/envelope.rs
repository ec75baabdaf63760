//! Response envelope normalization.
//!
//! Every response body has the same shape:
//!
//! ```text
//! {
//!   "version":    { "label": "v1", "number": "0.1.0" },
//!   "meta":       { "code": "OK", "error_type": "...", "error_message": "..." },
//!   "data":       { ...snake_case keys... },
//!   "pagination": { ... }
//! }
//! ```
//!
//! Handlers hand over [`Fragment`]s; [`EnvelopeBuilder`] merges them in
//! order. `data` and `pagination` are `{}` when nothing fills them, and empty
//! strings inside `version` and `meta` are omitted.

use std::io;

use serde::ser::Serialize;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::http::status::{self, ErrorStatus};

/// API version stamped into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct Version {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub number: String,
}

impl Version {
    pub fn new(label: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            number: number.into(),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new("v1", "0.1.0")
    }
}

/// Outcome description.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl Meta {
    /// Meta for a successful response: just the machine code.
    pub fn success(status: u16) -> Self {
        Self {
            code: status::machine_code(status).to_string(),
            ..Self::default()
        }
    }

    /// Meta for an error response.
    pub fn error(status: ErrorStatus, message: impl Into<String>) -> Self {
        Self {
            code: status.code().to_string(),
            error_type: status.text().to_string(),
            error_message: message.into(),
        }
    }
}

/// Page position of a list response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// The normalized response body.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct Envelope {
    pub version: Version,
    pub meta: Meta,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default = "empty_object")]
    pub pagination: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Envelope {
    /// An error envelope with empty `data` and `pagination`.
    pub fn error(version: Version, status: ErrorStatus, message: impl Into<String>) -> Self {
        Self {
            version,
            meta: Meta::error(status, message),
            data: Map::new(),
            pagination: empty_object(),
        }
    }

    /// Encode with `<`, `>`, `&`, U+2028 and U+2029 escaped inside strings.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        to_html_safe_vec(self).map_err(EnvelopeError::Serialize)
    }
}

/// Envelope construction failures. Callers answer these with a 500.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A fragment could not be turned into a JSON object.
    #[error("fragment #{index} could not be encoded: {reason}")]
    EncodingFailed { index: usize, reason: String },

    /// The finished envelope could not be written out.
    #[error("envelope could not be serialized: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// A value already converted to JSON, or the reason it could not be.
#[derive(Debug, Clone)]
pub struct Encoded(Result<Value, String>);

impl Encoded {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Self {
        Self(serde_json::to_value(value).map_err(|e| e.to_string()))
    }

    fn into_object(self, index: usize) -> Result<Map<String, Value>, EnvelopeError> {
        match self.0 {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(EnvelopeError::EncodingFailed {
                index,
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
            Err(reason) => Err(EnvelopeError::EncodingFailed { index, reason }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A list of records stored under a key derived from the record type.
#[derive(Debug, Clone)]
pub struct ListFragment {
    key: String,
    items: Vec<Encoded>,
}

/// One caller-supplied piece of a response.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Replaces `envelope.pagination`.
    Pagination(Pagination),
    /// Entries merged into `envelope.data`.
    Mapping(Map<String, Value>),
    /// Records inserted as an array under the snake_case type name.
    List(ListFragment),
    /// A record whose top-level fields are merged into `envelope.data`.
    Record(Encoded),
    /// Replaces `envelope.meta`.
    Error(Meta),
}

impl Fragment {
    pub fn mapping(map: Map<String, Value>) -> Self {
        Fragment::Mapping(map)
    }

    pub fn record<T: Serialize + ?Sized>(value: &T) -> Self {
        Fragment::Record(Encoded::new(value))
    }

    /// A list keyed by the snake_case name of `T`, e.g. `Vec<UserProfile>`
    /// lands under `user_profile`.
    pub fn list<T: Serialize>(items: &[T]) -> Self {
        Self::list_named(type_key::<T>(), items)
    }

    /// A list under an explicit key.
    pub fn list_named<T: Serialize>(key: impl Into<String>, items: &[T]) -> Self {
        Fragment::List(ListFragment {
            key: to_snake_case(&key.into()),
            items: items.iter().map(Encoded::new).collect(),
        })
    }

    pub fn pagination(pagination: Pagination) -> Self {
        Fragment::Pagination(pagination)
    }

    pub fn error(meta: Meta) -> Self {
        Fragment::Error(meta)
    }
}

impl From<Pagination> for Fragment {
    fn from(pagination: Pagination) -> Self {
        Fragment::Pagination(pagination)
    }
}

impl From<Map<String, Value>> for Fragment {
    fn from(map: Map<String, Value>) -> Self {
        Fragment::Mapping(map)
    }
}

impl From<Meta> for Fragment {
    fn from(meta: Meta) -> Self {
        Fragment::Error(meta)
    }
}

impl From<Value> for Fragment {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Fragment::Mapping(map),
            other => Fragment::Record(Encoded(Ok(other))),
        }
    }
}

/// Merges fragments into an [`Envelope`].
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    status: u16,
    version: Version,
    fragments: Vec<Fragment>,
}

impl EnvelopeBuilder {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            version: Version::default(),
            fragments: Vec::new(),
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn fragment(mut self, fragment: impl Into<Fragment>) -> Self {
        self.fragments.push(fragment.into());
        self
    }

    pub fn fragments<I>(mut self, fragments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Fragment>,
    {
        self.fragments.extend(fragments.into_iter().map(Into::into));
        self
    }

    /// Merge all fragments in order. Any encoding failure aborts the whole
    /// build; no partially merged envelope is produced.
    pub fn build(self) -> Result<Envelope, EnvelopeError> {
        let mut meta = Meta::success(self.status);
        let mut data = Map::new();
        let mut pagination = empty_object();

        for (index, fragment) in self.fragments.into_iter().enumerate() {
            match fragment {
                Fragment::Pagination(page) => {
                    pagination = serde_json::to_value(page).map_err(|e| {
                        EnvelopeError::EncodingFailed {
                            index,
                            reason: e.to_string(),
                        }
                    })?;
                }
                Fragment::Mapping(map) => merge(&mut data, map),
                Fragment::List(list) => {
                    let items = list
                        .items
                        .into_iter()
                        .map(|item| item.into_object(index).map(Value::Object))
                        .collect::<Result<Vec<_>, _>>()?;
                    data.insert(list.key, Value::Array(items));
                }
                Fragment::Record(encoded) => merge(&mut data, encoded.into_object(index)?),
                Fragment::Error(error) => meta = error,
            }
        }

        Ok(Envelope {
            version: self.version,
            meta,
            data,
            pagination,
        })
    }
}

/// Shorthand for `EnvelopeBuilder::new(status).fragments(fragments).build()`.
pub fn build<I>(status: u16, fragments: I) -> Result<Envelope, EnvelopeError>
where
    I: IntoIterator,
    I::Item: Into<Fragment>,
{
    EnvelopeBuilder::new(status).fragments(fragments).build()
}

// Later keys overwrite earlier ones.
fn merge(data: &mut Map<String, Value>, entries: Map<String, Value>) {
    for (key, value) in entries {
        data.insert(to_snake_case(&key), value);
    }
}

fn type_key<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let name = base.rsplit("::").next().unwrap_or(base);
    to_snake_case(name)
}

/// `UserProfile` → `user_profile`, `HTTPServer` → `http_server`,
/// `user-id` → `user_id`. Existing underscores are kept.
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '-' | ' ' | '.' => {
                if !out.is_empty() && !out.ends_with('_') {
                    out.push('_');
                }
            }
            c if c.is_uppercase() => {
                let prev = i.checked_sub(1).map(|j| chars[j]);
                let next = chars.get(i + 1).copied();
                let boundary = match prev {
                    Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                    Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                    _ => false,
                };
                if boundary && !out.ends_with('_') {
                    out.push('_');
                }
                out.extend(c.to_lowercase());
            }
            c => out.push(c),
        }
    }
    out
}

struct HtmlSafeFormatter;

impl serde_json::ser::Formatter for HtmlSafeFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let escaped = match c {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize to JSON with HTML-significant characters escaped.
pub fn to_html_safe_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::with_capacity(256);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, HtmlSafeFormatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}
