//! Age text-file parser (spec §4.2).
//!
//! An age file enumerates the *pages* that make up one age (region) of the
//! game world. Pages are resolved to page (PRP) file client paths by the
//! caller via [`page_client_path`].

pub use crate::page::error::{PageError, Result};
use dni_crypto::CipherReader;
use std::io::Read;
use std::path::Path;

/// Pages implied for every age regardless of whether they're declared.
pub const COMMON_PAGES: [&str; 2] = ["BuiltIn", "Textures"];

/// The parsed contents of an age file.
#[derive(Debug, Clone, Default)]
pub struct AgeInfo {
    /// Explicitly declared pages, in file order, followed by the always
    /// implied [`COMMON_PAGES`].
    pub pages: Vec<String>,
    /// The age's `SequencePrefix`, if declared.
    pub sequence_prefix: Option<i64>,
}

impl AgeInfo {
    /// Iterate every page name this age references, explicit pages first,
    /// then the implied common pages.
    pub fn all_pages(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(String::as_str).chain(COMMON_PAGES)
    }
}

/// Parse age file text.
pub fn parse_age(text: &str) -> Result<AgeInfo> {
    let mut info = AgeInfo::default();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(PageError::MalformedAgeLine(raw_line.to_string()));
        };
        match key.trim() {
            "Page" => {
                for name in value.split(',') {
                    let name = name.trim();
                    if !name.is_empty() {
                        info.pages.push(name.to_string());
                    }
                }
            }
            "SequencePrefix" => {
                let parsed: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| PageError::MalformedAgeLine(raw_line.to_string()))?;
                info.sequence_prefix = Some(parsed);
            }
            _ => {}
        }
    }
    Ok(info)
}

/// Read and parse an age file from disk, transparently decrypting it if
/// XTEA-framed.
pub fn read_age_file(path: &Path, key: Option<dni_crypto::CipherKey>) -> Result<AgeInfo> {
    let raw = std::fs::read(path)?;
    let mut head = [0u8; 16];
    let avail = raw.len().min(16);
    head[..avail].copy_from_slice(&raw[..avail]);
    let encryption = dni_crypto::detect(&head);

    let text = if encryption == dni_crypto::Encryption::Unspecified {
        String::from_utf8(raw)?
    } else {
        let key = key.unwrap_or_default();
        let mut reader = CipherReader::open(std::io::Cursor::new(raw), encryption, key)?;
        let mut buf = String::new();
        reader.read_to_string(&mut buf)?;
        buf
    };
    parse_age(&text)
}

/// The client path of a page file belonging to `age_name`.
pub fn page_client_path(age_name: &str, page_name: &str) -> String {
    format!("dat/{age_name}_District_{page_name}.prp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pages_and_prefix() {
        let text = "# a comment\nPage=Garden,GardenLinkingBook\nSequencePrefix=21\n\n";
        let info = parse_age(text).unwrap();
        assert_eq!(info.pages, vec!["Garden", "GardenLinkingBook"]);
        assert_eq!(info.sequence_prefix, Some(21));
    }

    #[test]
    fn common_pages_always_implied() {
        let info = parse_age("Page=Garden\n").unwrap();
        let all: Vec<&str> = info.all_pages().collect();
        assert_eq!(all, vec!["Garden", "BuiltIn", "Textures"]);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_age("not a valid line").is_err());
    }

    #[test]
    fn client_path_uses_district_convention() {
        assert_eq!(
            page_client_path("Teledahn", "BuiltIn"),
            "dat/Teledahn_District_BuiltIn.prp"
        );
    }
}
