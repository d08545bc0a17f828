use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Social platform a result item was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Twitter,
    Unknown,
}

/// Ordered candidate field paths for each normalized field of one platform.
///
/// A path is a dotted list of keys; a key suffixed with `[]` visits every
/// element of that array, e.g. `media[].photo_image.uri`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTable {
    pub images: &'static [&'static str],
    pub caption: &'static [&'static str],
    pub author: &'static [&'static str],
    pub post_url: &'static [&'static str],
}

const INSTAGRAM_FIELDS: FieldTable = FieldTable {
    images: &["images", "displayUrl", "childPosts[].displayUrl"],
    caption: &["caption"],
    author: &["ownerUsername", "ownerFullName"],
    post_url: &["url", "inputUrl"],
};

const FACEBOOK_FIELDS: FieldTable = FieldTable {
    images: &["media[].photo_image.uri", "media[].thumbnail", "images", "imageUrl"],
    caption: &["text", "message"],
    author: &["pageName", "user.name"],
    post_url: &["url", "postUrl", "facebookUrl"],
};

const TWITTER_FIELDS: FieldTable = FieldTable {
    images: &[
        "extendedEntities.media[].media_url_https",
        "entities.media[].media_url_https",
        "media[].media_url_https",
        "media",
    ],
    caption: &["fullText", "full_text", "text"],
    author: &["author.userName", "user.screen_name"],
    post_url: &["url", "twitterUrl"],
};

/// Unknown items keep every field; these are only read, never consumed.
const UNKNOWN_FIELDS: FieldTable = FieldTable {
    images: &[
        "displayUrl",
        "imageUrl",
        "images",
        "displayUrls",
        "imageUrls",
        "mediaUrls",
        "media",
    ],
    caption: &[],
    author: &[],
    post_url: &["url"],
};

const URL_FIELDS: &[&str] = &["url", "inputUrl", "postUrl", "facebookUrl", "twitterUrl"];

impl Platform {
    pub fn fields(self) -> &'static FieldTable {
        match self {
            Platform::Instagram => &INSTAGRAM_FIELDS,
            Platform::Facebook => &FACEBOOK_FIELDS,
            Platform::Twitter => &TWITTER_FIELDS,
            Platform::Unknown => &UNKNOWN_FIELDS,
        }
    }

    /// Classify a URL by host.
    pub fn from_url(raw: &str) -> Platform {
        let Ok(parsed) = url::Url::parse(raw) else {
            return Platform::Unknown;
        };
        let Some(host) = parsed.host_str() else {
            return Platform::Unknown;
        };
        let host = host.to_ascii_lowercase();
        if host_matches(&host, "instagram.com") {
            Platform::Instagram
        } else if host_matches(&host, "facebook.com") || host_matches(&host, "fb.com") {
            Platform::Facebook
        } else if host_matches(&host, "twitter.com") || host_matches(&host, "x.com") {
            Platform::Twitter
        } else {
            Platform::Unknown
        }
    }

    /// Classify an item by the first URL-bearing field with a known host.
    pub fn detect(fields: &Map<String, Value>) -> Platform {
        URL_FIELDS
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(Platform::from_url)
            .find(|platform| *platform != Platform::Unknown)
            .unwrap_or(Platform::Unknown)
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Every value reached by `path` inside `root`.
pub(crate) fn resolve<'a>(root: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        let (key, each) = split_segment(head);
        if let Some(value) = root.get(key) {
            step(value, each, rest, &mut out);
        }
    }
    out
}

fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    let (key, each) = split_segment(head);
    if let Some(next) = value.get(key) {
        step(next, each, rest, out);
    }
}

fn step<'a>(value: &'a Value, each: bool, rest: &[&str], out: &mut Vec<&'a Value>) {
    if each {
        if let Value::Array(items) = value {
            for item in items {
                walk(item, rest, out);
            }
        }
    } else {
        walk(value, rest, out);
    }
}

fn split_segment(segment: &str) -> (&str, bool) {
    match segment.strip_suffix("[]") {
        Some(key) => (key, true),
        None => (segment, false),
    }
}

/// Non-empty strings among the resolved values; arrays of strings are flattened.
pub(crate) fn strings_at(root: &Map<String, Value>, path: &str) -> Vec<String> {
    let mut out = Vec::new();
    for value in resolve(root, path) {
        match value {
            Value::String(s) => push_non_empty(&mut out, s),
            Value::Array(items) => {
                for item in items {
                    if let Value::String(s) = item {
                        push_non_empty(&mut out, s);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn push_non_empty(out: &mut Vec<String>, s: &str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_owned());
    }
}

/// Top-level key consumed whole by `path`, if the path has a single segment.
pub(crate) fn whole_field(path: &str) -> Option<&str> {
    if path.contains('.') || path.ends_with("[]") {
        None
    } else {
        Some(path)
    }
}
