//! Figment provider for the legacy `~/.softlayer` INI file.

use std::path::{Path, PathBuf};

use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider};

/// Reads one section of an INI file. A missing file provides nothing.
#[derive(Debug, Clone)]
pub struct IniFile {
    path: PathBuf,
    section: String,
}

impl IniFile {
    /// The `[softlayer]` section of `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            section: "softlayer".to_owned(),
        }
    }

    #[must_use]
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }
}

impl Provider for IniFile {
    fn metadata(&self) -> Metadata {
        Metadata::from("INI file", figment::Source::File(self.path.clone()))
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(Error::from(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        Ok(Profile::Default.collect(parse_section(&text, &self.section)))
    }
}

/// Collect `key = value` (or `key: value`) pairs of one section. Keys are
/// lowercased; empty values are skipped.
fn parse_section(text: &str, section: &str) -> Dict {
    let mut dict = Dict::new();
    let mut in_section = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim().eq_ignore_ascii_case(section);
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        dict.insert(key.trim().to_ascii_lowercase(), Value::from(value.to_owned()));
    }
    dict
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn only_the_named_section_is_read() {
        let text = "\
[other]
username = nobody

[SoftLayer]
# comment
username = alice
API_KEY = 0123abcd
endpoint_url: https://api.softlayer.com/xmlrpc/v3.1/
timeout = 60
proxy =
";
        let dict = parse_section(text, "softlayer");
        assert_eq!(dict.len(), 4);
        assert_eq!(dict["username"].as_str(), Some("alice"));
        assert_eq!(dict["api_key"].as_str(), Some("0123abcd"));
        assert_eq!(
            dict["endpoint_url"].as_str(),
            Some("https://api.softlayer.com/xmlrpc/v3.1/")
        );
        assert!(!dict.contains_key("proxy"));
    }

    #[test]
    fn missing_file_provides_nothing() {
        let provider = IniFile::file("/definitely/not/here/.softlayer");
        assert!(provider.data().unwrap().is_empty());
    }
}
