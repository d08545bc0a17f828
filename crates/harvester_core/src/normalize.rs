use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::naming::{CaptureTimestamp, ImageAsset};
use crate::platform::{strings_at, whole_field, Platform};
use crate::SequenceIndex;

/// One platform-native post exactly as the scraping service returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawResultItem(Value);

impl RawResultItem {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for RawResultItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("result item {sequence_index} is not a JSON object (found {found})")]
pub struct SchemaError {
    pub sequence_index: SequenceIndex,
    pub found: &'static str,
}

/// Platform-independent shape of one post.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub sequence_index: SequenceIndex,
    pub timestamp: CaptureTimestamp,
    pub platform: Platform,
    pub post_url: Option<String>,
    pub caption: Option<String>,
    pub author: Option<String>,
    pub image_urls: Vec<String>,
    pub extra: Map<String, Value>,
}

impl NormalizedRecord {
    /// Image assets in ordinal order, ordinals starting at 1.
    pub fn image_assets(&self) -> Vec<ImageAsset> {
        self.image_urls
            .iter()
            .zip(1u32..)
            .map(|(url, ordinal)| ImageAsset {
                sequence_index: self.sequence_index,
                timestamp: self.timestamp,
                ordinal,
                source_url: url.clone(),
            })
            .collect()
    }
}

/// Maps platform-specific result items into [`NormalizedRecord`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultNormalizer {
    platform_hint: Option<Platform>,
}

impl ResultNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `platform` for every item instead of detecting it from item URLs.
    pub fn with_platform(platform: Platform) -> Self {
        Self {
            platform_hint: Some(platform),
        }
    }

    pub fn normalize(
        &self,
        raw: RawResultItem,
        sequence_index: SequenceIndex,
        timestamp: CaptureTimestamp,
    ) -> Result<NormalizedRecord, SchemaError> {
        let fields = match raw.into_value() {
            Value::Object(fields) => fields,
            other => {
                return Err(SchemaError {
                    sequence_index,
                    found: json_kind(&other),
                })
            }
        };

        let platform = self
            .platform_hint
            .unwrap_or_else(|| Platform::detect(&fields));

        let mut record = NormalizedRecord {
            sequence_index,
            timestamp,
            platform,
            post_url: None,
            caption: None,
            author: None,
            image_urls: Vec::new(),
            extra: Map::new(),
        };

        if platform == Platform::Unknown {
            let table = platform.fields();
            for path in table.images {
                record.image_urls.extend(strings_at(&fields, path));
            }
            record.post_url = first_text(&fields, table.post_url).map(|(text, _)| text);
            dedupe_in_place(&mut record.image_urls);
            record.extra = fields;
            return Ok(record);
        }

        let table = platform.fields();
        let mut consumed: Vec<&'static str> = Vec::new();

        if let Some((urls, path)) = first_strings(&fields, table.images) {
            record.image_urls = urls;
            consumed.extend(captured_field(&fields, path));
        }
        if let Some((text, path)) = first_text(&fields, table.caption) {
            record.caption = Some(text);
            consumed.extend(captured_text(&fields, path));
        }
        if let Some((text, path)) = first_text(&fields, table.author) {
            record.author = Some(text);
            consumed.extend(captured_text(&fields, path));
        }
        if let Some((text, path)) = first_text(&fields, table.post_url) {
            record.post_url = Some(text);
            consumed.extend(captured_text(&fields, path));
        }
        dedupe_in_place(&mut record.image_urls);

        record.extra = fields
            .into_iter()
            .filter(|(key, _)| !consumed.contains(&key.as_str()))
            .collect();
        Ok(record)
    }
}

fn first_strings(
    fields: &Map<String, Value>,
    paths: &'static [&'static str],
) -> Option<(Vec<String>, &'static str)> {
    paths.iter().find_map(|path| {
        let found = strings_at(fields, path);
        (!found.is_empty()).then_some((found, *path))
    })
}

fn first_text(
    fields: &Map<String, Value>,
    paths: &'static [&'static str],
) -> Option<(String, &'static str)> {
    first_strings(fields, paths)
        .and_then(|(found, path)| found.into_iter().next().map(|text| (text, path)))
}

/// Top-level key a winning path copied in full: a single-segment path whose
/// value is a string or an array holding only strings.
fn captured_field(fields: &Map<String, Value>, path: &'static str) -> Option<&'static str> {
    let key = whole_field(path)?;
    match fields.get(key)? {
        Value::String(_) => Some(key),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(key),
        _ => None,
    }
}

fn captured_text(fields: &Map<String, Value>, path: &'static str) -> Option<&'static str> {
    let key = whole_field(path)?;
    fields.get(key)?.is_string().then_some(key)
}

fn dedupe_in_place(urls: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
