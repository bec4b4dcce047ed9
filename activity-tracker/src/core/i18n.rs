/*!
Translation catalog lookups.

Catalogs are flat JSON maps, one file per locale. A missing key resolves to
the key itself so a stale catalog never breaks message building.
*/

use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Translator {
    locale: String,
    catalog: HashMap<String, String>,
}

impl Translator {
    /// Load the catalog for a locale from `<dir>/<locale>.json`, falling
    /// back to the `en` catalog when the locale file is missing.
    pub fn load<P: AsRef<Path>>(
        translations_dir: P,
        locale: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = translations_dir.as_ref();
        let locale_path = dir.join(format!("{locale}.json"));

        let (resolved_locale, path) = if locale_path.exists() {
            (locale.to_string(), locale_path)
        } else {
            warn!("No catalog for locale {}, falling back to en", locale);
            ("en".to_string(), dir.join("en.json"))
        };

        let contents = std::fs::read_to_string(path)?;
        let catalog: HashMap<String, String> = serde_json::from_str(&contents)?;

        Ok(Self {
            locale: resolved_locale,
            catalog,
        })
    }

    pub fn with_catalog(locale: &str, catalog: HashMap<String, String>) -> Self {
        Self {
            locale: locale.to_string(),
            catalog,
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Look up a key; unknown keys come back verbatim.
    pub fn translate(&self, key: &str) -> String {
        match self.catalog.get(key) {
            Some(value) => value.clone(),
            None => key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> HashMap<String, String> {
        HashMap::from([
            ("greeting".to_string(), "hello".to_string()),
            ("farewell".to_string(), "goodbye".to_string()),
        ])
    }

    #[test]
    fn translate_returns_catalog_value() {
        let translator = Translator::with_catalog("en", catalog());
        assert_eq!(translator.translate("greeting"), "hello");
    }

    #[test]
    fn missing_key_falls_back_to_key_itself() {
        let translator = Translator::with_catalog("en", catalog());
        assert_eq!(translator.translate("nonexistent.key"), "nonexistent.key");
    }

    #[test]
    fn translate_is_pure() {
        let translator = Translator::with_catalog("en", catalog());
        assert_eq!(
            translator.translate("farewell"),
            translator.translate("farewell")
        );
    }
}
