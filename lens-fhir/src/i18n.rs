//! Message lookup for lens explanations.

use std::collections::HashMap;

use lens_core::LensConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Language → key → text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Translations(HashMap<String, HashMap<String, String>>);

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        language: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.0
            .entry(language.into())
            .or_default()
            .insert(key.into(), text.into());
    }

    /// Read a `{lang: {key: text}}` tree, ignoring anything not shaped that way.
    pub fn from_value(value: &Value) -> Self {
        let mut translations = Self::new();
        let Some(languages) = value.as_object() else {
            return translations;
        };
        for (language, messages) in languages {
            let Some(messages) = messages.as_object() else {
                continue;
            };
            for (key, text) in messages {
                if let Some(text) = text.as_str() {
                    translations.insert(language.as_str(), key.as_str(), text);
                }
            }
        }
        translations
    }

    /// Text for `key` in `language`, then in its primary subtag (`pt` for
    /// `pt-PT`), then in `fallback`. Unknown keys echo back unchanged.
    pub fn lookup(&self, key: &str, language: &str, fallback: &str) -> String {
        let primary = language.split(['-', '_']).next().unwrap_or(language);
        [language, primary, fallback]
            .into_iter()
            .find_map(|candidate| self.text(candidate, key))
            .unwrap_or(key)
            .to_string()
    }

    fn text(&self, language: &str, key: &str) -> Option<&str> {
        self.0
            .get(language)
            .and_then(|messages| messages.get(key))
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }
}

/// Lookup with the fallback language taken from `config`.
pub fn translate(
    translations: &Translations,
    key: &str,
    language: &str,
    config: &LensConfig,
) -> String {
    translations.lookup(key, language, &config.default_language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dictionary() -> Translations {
        Translations::from_value(&json!({
            "en": {"pregnancy": "Pregnancy warning", "empty": ""},
            "es": {"pregnancy": "Advertencia de embarazo"},
            "pt": "not-a-map"
        }))
    }

    #[test]
    fn prefers_requested_then_primary_then_fallback() {
        let dict = dictionary();
        assert_eq!(dict.lookup("pregnancy", "es", "en"), "Advertencia de embarazo");
        assert_eq!(dict.lookup("pregnancy", "es-ES", "en"), "Advertencia de embarazo");
        assert_eq!(dict.lookup("pregnancy", "pt", "en"), "Pregnancy warning");
    }

    #[test]
    fn unknown_or_blank_keys_echo_back() {
        let dict = dictionary();
        assert_eq!(dict.lookup("missing", "en", "en"), "missing");
        assert_eq!(dict.lookup("empty", "en", "en"), "empty");
        assert_eq!(Translations::new().lookup("anything", "en", "en"), "anything");
    }

    #[test]
    fn translate_uses_configured_default_language() {
        let dict = dictionary();
        let config = LensConfig::default();
        assert_eq!(translate(&dict, "pregnancy", "fr", &config), "Pregnancy warning");
    }
}
