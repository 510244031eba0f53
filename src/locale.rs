//! Localized message catalogs
//!
//! Each language has a `messages_<lang>.properties` file of `key=value`
//! lines. The first configured language is the default: keys it defines
//! are filled into every other language that lacks them.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::value::{Map, Value};

/// Errors that can occur while loading locale files
#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("cannot read locale file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("{path}:{line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Immutable mapping of language code to message key to localized text
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    languages: HashMap<String, Arc<Map>>,
    empty: Arc<Map>,
}

impl MessageCatalog {
    /// Create a catalog without languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the messages of `lang`, builder style
    pub fn with_language<K, V>(
        mut self,
        lang: impl Into<String>,
        messages: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map = messages
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        self.languages.insert(lang.into(), Arc::new(map));
        self
    }

    pub fn messages(&self, lang: &str) -> Option<&Map> {
        self.languages.get(lang).map(Arc::as_ref)
    }

    /// Localized text of `key` in `lang`
    pub fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.messages(lang)?.get(key).and_then(Value::as_str)
    }

    /// Messages of `lang` as a template value; an empty map when unknown
    pub fn messages_value(&self, lang: &str) -> Value {
        let map = self.languages.get(lang).unwrap_or(&self.empty);
        Value::Map(Arc::clone(map))
    }

    /// Known language codes, sorted
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

/// Path of the messages file of `lang` in `dir`
pub fn messages_path(dir: &Path, lang: &str) -> PathBuf {
    dir.join(format!("messages_{}.properties", lang))
}

/// Load `messages_<lang>.properties` for every language in `languages`
pub fn load<S: AsRef<str>>(dir: &Path, languages: &[S]) -> Result<MessageCatalog, LocaleError> {
    let mut loaded: Vec<(String, Vec<(String, String)>)> = Vec::with_capacity(languages.len());
    for lang in languages {
        let lang = lang.as_ref();
        let path = messages_path(dir, lang);
        let text = fs::read_to_string(&path).map_err(|source| LocaleError::Read {
            path: path.clone(),
            source,
        })?;
        let entries = parse_properties(&text).map_err(|(line, message)| LocaleError::Syntax {
            path: path.clone(),
            line,
            message,
        })?;
        debug!(lang, messages = entries.len(), "loaded locale");
        loaded.push((lang.to_string(), entries));
    }

    let default: HashMap<String, String> = loaded
        .first()
        .map(|(_, entries)| entries.iter().cloned().collect())
        .unwrap_or_default();

    let mut catalog = MessageCatalog::new();
    for (lang, entries) in loaded {
        let mut messages = default.clone();
        messages.extend(entries);
        catalog = catalog.with_language(lang, messages);
    }
    Ok(catalog)
}

/// Parse the contents of a `.properties` file
///
/// Errors carry the 1-based line number and a message.
pub fn parse_properties(text: &str) -> Result<Vec<(String, String)>, (usize, String)> {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((index, raw)) = lines.next() {
        let line_number = index + 1;
        let mut logical = raw.trim_start().to_string();
        if logical.is_empty() || logical.starts_with('#') || logical.starts_with('!') {
            continue;
        }
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let Some(separator) = find_separator(&logical) else {
            return Err((line_number, format!("missing '=' in {:?}", logical)));
        };
        let key = unescape(logical[..separator].trim());
        let value = unescape(logical[separator + 1..].trim());
        if key.is_empty() {
            return Err((line_number, "empty key".to_string()));
        }
        entries.push((key, value));
    }
    Ok(entries)
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Byte offset of the first unescaped `=` or `:`
fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some(i),
            _ => {}
        }
    }
    None
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_properties() {
        let text = "# comment\n! also comment\n\ngreeting = Hello\nfarewell: Bye\n  padded=  x  \n";
        assert_eq!(
            parse_properties(text).unwrap(),
            pairs(&[("greeting", "Hello"), ("farewell", "Bye"), ("padded", "x")])
        );
    }

    #[test]
    fn test_parse_continuation_and_escapes() {
        let text = "long = first \\\n    second\nescaped\\=key = a\\tb\nunicode = caf\\u00e9\n";
        assert_eq!(
            parse_properties(text).unwrap(),
            pairs(&[
                ("long", "first second"),
                ("escaped=key", "a\tb"),
                ("unicode", "café"),
            ])
        );
    }

    #[test]
    fn test_value_may_contain_separators() {
        assert_eq!(
            parse_properties("url = http://example.com/?a=b").unwrap(),
            pairs(&[("url", "http://example.com/?a=b")])
        );
    }

    #[test]
    fn test_parse_errors_carry_line() {
        assert_eq!(
            parse_properties("ok=1\nbroken line\n").unwrap_err().0,
            2
        );
        assert_eq!(parse_properties("=value").unwrap_err().1, "empty key");
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = MessageCatalog::new().with_language("en", [("greeting", "Hello")]);
        assert_eq!(catalog.lookup("en", "greeting"), Some("Hello"));
        assert_eq!(catalog.lookup("en", "missing"), None);
        assert_eq!(catalog.lookup("fr", "greeting"), None);
    }

    #[test]
    fn test_messages_value_for_unknown_language_is_empty_map() {
        let catalog = MessageCatalog::new().with_language("en", [("greeting", "Hello")]);
        assert_eq!(catalog.messages_value("de"), Value::map(Map::new()));
        assert_eq!(catalog.messages_value(""), Value::map(Map::new()));
    }

    #[test]
    fn test_load_with_default_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(messages_path(dir.path(), "en"), "greeting=Hello\nfarewell=Bye\n").unwrap();
        fs::write(messages_path(dir.path(), "fr"), "greeting=Bonjour\n").unwrap();

        let catalog = load(dir.path(), &["en", "fr"]).unwrap();
        assert_eq!(catalog.languages(), vec!["en", "fr"]);
        assert_eq!(catalog.lookup("fr", "greeting"), Some("Bonjour"));
        assert_eq!(catalog.lookup("fr", "farewell"), Some("Bye"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path(), &["en"]).unwrap_err();
        assert!(matches!(err, LocaleError::Read { .. }));
    }

    #[test]
    fn test_load_no_languages() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = load::<&str>(dir.path(), &[]).unwrap();
        assert!(catalog.is_empty());
    }
}
