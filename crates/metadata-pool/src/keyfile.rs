//! Minimal reader for INI-style keyfiles (desktop entries, `appstream.conf`).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{PoolError, Result};

#[derive(Debug, Default, Clone)]
pub struct KeyFile {
    groups: Vec<(String, HashMap<String, String>)>,
}

impl KeyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::parse(&data).map_err(|message| PoolError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parses keyfile text. Errors carry the offending line number.
    pub fn parse(data: &str) -> std::result::Result<Self, String> {
        let mut keyfile = KeyFile::default();

        for (index, raw_line) in data.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let Some(name) = name.strip_suffix(']') else {
                    return Err(format!("line {}: unterminated group header", index + 1));
                };
                keyfile.groups.push((name.to_string(), HashMap::new()));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("line {}: expected key=value", index + 1));
            };
            let Some((_, entries)) = keyfile.groups.last_mut() else {
                return Err(format!("line {}: key outside of a group", index + 1));
            };
            entries.insert(key.trim().to_string(), unescape(value.trim()));
        }

        Ok(keyfile)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.group(group).is_some()
    }

    pub fn string(&self, group: &str, key: &str) -> Option<&str> {
        self.group(group)?.get(key).map(String::as_str)
    }

    /// Looks up `key[locale]`, falling back to the language part of the
    /// locale and finally to the untranslated key.
    pub fn locale_string(&self, group: &str, key: &str, locale: &str) -> Option<&str> {
        let entries = self.group(group)?;
        let locale = locale.split(['.', '@']).next().unwrap_or(locale);
        let lang = locale.split('_').next().unwrap_or(locale);

        [locale, lang]
            .iter()
            .filter(|candidate| !candidate.is_empty())
            .find_map(|candidate| entries.get(&format!("{key}[{candidate}]")))
            .or_else(|| entries.get(key))
            .map(String::as_str)
    }

    /// Semicolon-separated list values with empty items dropped.
    pub fn string_list(&self, group: &str, key: &str) -> Vec<String> {
        self.string(group, key).map(split_list).unwrap_or_default()
    }

    pub fn locale_string_list(&self, group: &str, key: &str, locale: &str) -> Vec<String> {
        self.locale_string(group, key, locale)
            .map(split_list)
            .unwrap_or_default()
    }

    pub fn boolean(&self, group: &str, key: &str) -> Option<bool> {
        match self.string(group, key)? {
            value if value.eq_ignore_ascii_case("true") || value == "1" => Some(true),
            value if value.eq_ignore_ascii_case("false") || value == "0" => Some(false),
            _ => None,
        }
    }

    fn group(&self, group: &str) -> Option<&HashMap<String, String>> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, entries)| entries)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
