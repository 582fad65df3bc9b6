//! Per-file metadata, as published in `<path>.info` documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// `YYYY-MM-DD HH:MM:SS`, the only timestamp layout repositories publish.
const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATETIME_LENGTH: usize = 19;

/// Metadata describing one repository file.
///
/// The recognised keys are typed when they have the expected shape; anything
/// else, including a recognised key holding the wrong JSON type, is kept in
/// [`extra`](Self::extra) and written back untouched. Only a document that
/// isn't a JSON object fails to parse.
///
/// ```
/// use serverfiles_catalog::FileMetadata;
///
/// let metadata: FileMetadata = serde_json::from_str(
///     r#"{"datetime": "2020-01-01 00:00:00", "compression": "gz", "version": 3}"#,
/// ).unwrap();
/// assert_eq!(metadata.compression.as_deref(), Some("gz"));
/// assert_eq!(metadata.extra["version"], 3);
/// assert!(metadata.modified().is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct FileMetadata {
    /// Remote last-modified time, `YYYY-MM-DD HH:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// One of `none`, `gz`, `bz2`, `tar.gz`, `tar.bz2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for FileMetadata {
    fn from(mut extra: Map<String, Value>) -> Self {
        let datetime = take_if(&mut extra, "datetime", |value| value.as_str().map(str::to_string));
        let compression = take_if(&mut extra, "compression", |value| value.as_str().map(str::to_string));
        let title = take_if(&mut extra, "title", |value| value.as_str().map(str::to_string));
        let tags = take_if(&mut extra, "tags", |value| {
            value.as_array()?.iter().map(|tag| tag.as_str().map(str::to_string)).collect()
        });
        Self { datetime, compression, tags, title, extra }
    }
}

/// Move `key` out of `extra` when `convert` accepts its value.
fn take_if<T>(extra: &mut Map<String, Value>, key: &str, convert: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
    let typed = convert(extra.get(key)?)?;
    extra.remove(key);
    Some(typed)
}

impl FileMetadata {
    /// The parsed `datetime`, or `None` when it is missing or malformed.
    ///
    /// Anything after the first 19 characters (fractional seconds, offsets)
    /// is ignored.
    pub fn modified(&self) -> Option<PrimitiveDateTime> {
        let value = self.datetime.as_deref()?;
        let value = value.get(..DATETIME_LENGTH).unwrap_or(value);
        PrimitiveDateTime::parse(value, DATETIME_FORMAT).ok()
    }

    /// Set `datetime` from a timestamp, in the published layout.
    pub fn with_modified(mut self, modified: PrimitiveDateTime) -> Self {
        self.datetime = modified.format(DATETIME_FORMAT).ok();
        self.extra.remove("datetime");
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self.extra.remove("compression");
        self
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}
