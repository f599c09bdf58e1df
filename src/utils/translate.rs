//! Locale-aware label resolution.
//!
//! Bundle manifests and parameter schemas carry display text either as a
//! plain string or as a map from locale tag to text. `translate` picks the
//! best entry for a locale without touching any global state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display text, optionally localized.
///
/// ```json
/// "Hello World"
/// { "en": "Hello World", "zh": "你好世界" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelText {
    Plain(String),
    /// Locale tag to text, in manifest order.
    Localized(Map<String, Value>),
}

impl LabelText {
    /// Build a localized label from `(locale, text)` pairs.
    pub fn localized<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        LabelText::Localized(
            entries
                .into_iter()
                .map(|(locale, text)| (locale.to_string(), Value::String(text.to_string())))
                .collect(),
        )
    }
}

impl From<&str> for LabelText {
    fn from(text: &str) -> Self {
        LabelText::Plain(text.to_string())
    }
}

impl From<String> for LabelText {
    fn from(text: String) -> Self {
        LabelText::Plain(text)
    }
}

/// Resolve `label` for `locale`.
///
/// Resolution order: exact tag match, then language match ignoring the
/// territory (`zh-CN` satisfies `zh` and vice versa, case-insensitive), then
/// the first entry, then the empty string.
pub fn translate(label: &LabelText, locale: &str) -> String {
    let entries = match label {
        LabelText::Plain(text) => return text.clone(),
        LabelText::Localized(entries) => entries,
    };

    if let Some(text) = entries.get(locale).and_then(Value::as_str) {
        return text.to_string();
    }

    let lang = language_of(locale);
    if let Some(text) = entries
        .iter()
        .find(|(tag, _)| language_of(tag) == lang)
        .and_then(|(_, text)| text.as_str())
    {
        return text.to_string();
    }

    entries
        .values()
        .find_map(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Resolve `label` for the process locale.
pub fn translate_label(label: &LabelText) -> String {
    translate(label, &system_language())
}

/// Language of the process locale, e.g. `en` for `en_US.UTF-8`.
///
/// Reads `LC_ALL`, `LC_MESSAGES` and `LANG` in that order and falls back to
/// `en` when none is set or the value is `C`/`POSIX`.
pub fn system_language() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| language_of(&value))
        .find(|lang| !lang.is_empty() && lang != "c" && lang != "posix")
        .unwrap_or_else(|| "en".to_string())
}

fn language_of(tag: &str) -> String {
    tag.split(['-', '_', '.', '@'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
