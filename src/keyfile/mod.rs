/*!
 * KeyFile
 * Ordered section/key-value metadata format used by deployments,
 * policy overrides and the transient identity record
 */

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Result type for keyfile operations
#[must_use = "keyfile operations can fail and must be handled"]
pub type KeyFileResult<T> = Result<T, KeyFileError>;

/// KeyFile errors
#[derive(Error, Debug)]
pub enum KeyFileError {
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("missing required key '{key}' in section '{section}'")]
    MissingKey { section: String, key: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// An ordered collection of named sections, each holding ordered
/// `key=value` entries. Section and key order are preserved so that a
/// parse/serialize round-trip is lossless on content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    sections: Vec<Section>,
}

impl KeyFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the textual format. `#` comment lines and blank lines are
    /// accepted and discarded; keys outside any section are an error.
    pub fn parse(input: &str) -> KeyFileResult<Self> {
        let mut keyfile = Self::new();
        let mut current: Option<usize> = None;

        for (idx, raw) in input.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| KeyFileError::Parse {
                    line: idx + 1,
                    reason: format!("unterminated section header '{}'", raw.trim()),
                })?;
                if name.is_empty() {
                    return Err(KeyFileError::Parse {
                        line: idx + 1,
                        reason: "empty section name".to_string(),
                    });
                }
                current = Some(keyfile.section_index_or_insert(name));
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| KeyFileError::Parse {
                line: idx + 1,
                reason: format!("expected 'key=value', got '{}'", line),
            })?;
            let key = key.trim_end();
            if key.is_empty() {
                return Err(KeyFileError::Parse {
                    line: idx + 1,
                    reason: "empty key".to_string(),
                });
            }
            let section = current.ok_or_else(|| KeyFileError::Parse {
                line: idx + 1,
                reason: format!("key '{}' outside any section", key),
            })?;
            keyfile.sections[section]
                .entries
                .push((key.to_string(), value.trim_start().to_string()));
        }

        Ok(keyfile)
    }

    /// Read and parse a file.
    pub fn load(path: &Path) -> KeyFileResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| KeyFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Serialize and write to a file.
    pub fn save(&self, path: &Path) -> KeyFileResult<()> {
        std::fs::write(path, self.to_string()).map_err(|source| KeyFileError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Section names in file order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.iter().any(|s| s.name == section)
    }

    /// Entries of one section in file order, empty if the section is absent.
    pub fn entries<'a>(&'a self, section: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.sections
            .iter()
            .filter(move |s| s.name == section)
            .flat_map(|s| s.entries.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Last value for a key in a section (later entries shadow earlier ones).
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get) but missing keys are an error identifying
    /// the section and key.
    pub fn require(&self, section: &str, key: &str) -> KeyFileResult<&str> {
        self.get(section, key).ok_or_else(|| KeyFileError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Split a `;`-separated list value, dropping empty items (so a
    /// trailing `;` is accepted).
    pub fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get(section, key).map(|value| {
            value
                .split(';')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Set a key, replacing an existing entry in place or appending.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let idx = self.section_index_or_insert(section);
        let entries = &mut self.sections[idx].entries;
        let value = value.into();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key.to_string(), value)),
        }
    }

    /// Set a `;`-separated list value with a trailing separator.
    pub fn set_list<I, S>(&mut self, section: &str, key: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut value = String::new();
        for item in items {
            value.push_str(item.as_ref());
            value.push(';');
        }
        self.set(section, key, value);
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return idx;
        }
        self.sections.push(Section {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.sections.len() - 1
    }
}

impl fmt::Display for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "{}={}", key, value)?;
            }
        }
        Ok(())
    }
}
