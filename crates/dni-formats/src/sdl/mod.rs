//! SDL state-descriptor parser (spec §4.3).
//!
//! Tokenizes and parses versioned `STATEDESC` definitions. SDL files in this
//! role must never be encrypted; [`Manager::load_file`] rejects any file
//! that carries a recognized stream-cipher header.

pub mod error;

use std::path::{Path, PathBuf};

pub use error::{Result, SdlError};

/// The type of a declared `VAR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableType {
    /// `INT`
    Int32,
    /// `FLOAT`
    Float,
    /// `BOOL`
    Bool,
    /// `STRING32`
    String,
    /// `PLKEY`
    Key,
    /// An embedded `$descriptor` reference; see [`Variable::descriptor`].
    Descriptor,
    /// `CREATABLE` or `MESSAGE`
    Creatable,
    /// `DOUBLE`
    Double,
    /// `TIME`
    Time,
    /// `AGETIMEOFDAY`
    AgeTimeOfDay,
    /// `BYTE`
    Byte,
    /// `SHORT`
    Short,
    /// `VECTOR3`
    Vector3,
    /// `POINT3`
    Point3,
    /// `RGB`
    Rgb,
    /// `RGBA`
    Rgba,
    /// `QUAT` or `QUATERNION`
    Quat,
    /// `RGB8`
    Rgb8,
    /// `RGBA8`
    Rgba8,
}

fn lookup_variable_type(token: &str) -> Option<VariableType> {
    Some(match token.to_ascii_lowercase().as_str() {
        "int" => VariableType::Int32,
        "float" => VariableType::Float,
        "bool" => VariableType::Bool,
        "string32" => VariableType::String,
        "plkey" => VariableType::Key,
        "creatable" | "message" => VariableType::Creatable,
        "double" => VariableType::Double,
        "time" => VariableType::Time,
        "agetimeofday" => VariableType::AgeTimeOfDay,
        "byte" => VariableType::Byte,
        "short" => VariableType::Short,
        "vector3" => VariableType::Vector3,
        "point3" => VariableType::Point3,
        "rgb" => VariableType::Rgb,
        "rgba" => VariableType::Rgba,
        "quat" | "quaternion" => VariableType::Quat,
        "rgb8" => VariableType::Rgb8,
        "rgba8" => VariableType::Rgba8,
        _ => return None,
    })
}

/// One `VAR` declaration inside a `STATEDESC`.
#[derive(Debug, Clone)]
pub struct Variable {
    /// The variable's declared type.
    pub var_type: VariableType,
    /// For [`VariableType::Descriptor`], the name of the embedded descriptor.
    pub descriptor: Option<String>,
    /// The variable's name.
    pub name: String,
    /// The `[N]` range, if any. `None` means unbounded (no brackets, or
    /// empty brackets `[]`).
    pub range: Option<i64>,
}

/// A single `STATEDESC` block.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    /// The `VERSION` value.
    pub version: i64,
    /// The descriptor's name, as written in the file (case preserved).
    pub name: String,
    /// Declared variables, in file order.
    pub variables: Vec<Variable>,
    /// The SDL file this descriptor was loaded from, if loaded via
    /// [`Manager::load_file`] rather than [`Manager::read_descriptors`]
    /// directly. The resolver uses this to know which asset to stage for
    /// a descriptor found in the reachability closure.
    pub source: Option<PathBuf>,
}

#[derive(PartialEq)]
enum State {
    Invalid,
    Statedesc,
    Version,
    Variable,
    VariableType,
    VariableName,
    VariableRange,
    VariableDefault,
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut in_block_comment = false;
    while i < bytes.len() {
        if in_block_comment {
            if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                in_block_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            in_block_comment = true;
            i += 2;
            continue;
        }
        if (bytes[i] == b'#') || (bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/')
        {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if "{}[]()=,;".contains(c) || c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if !c.is_whitespace() {
                tokens.push(c.to_string());
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse the text of one or more `STATEDESC` definitions.
pub fn parse_descriptors(text: &str) -> Result<Vec<Descriptor>> {
    let filtered = strip_comments(text);
    let tokens = tokenize(&filtered);

    let mut descriptors = Vec::new();
    let mut state = State::Invalid;
    let mut desc: Option<Descriptor> = None;
    let mut var: Option<Variable> = None;

    for token in &tokens {
        match state {
            State::Invalid => {
                if token.eq_ignore_ascii_case("statedesc") {
                    state = State::Statedesc;
                    desc = Some(Descriptor::default());
                } else {
                    return Err(SdlError::UnexpectedToken(token.clone()));
                }
            }
            State::Statedesc => {
                let d = desc.as_mut().expect("descriptor started");
                if d.name.is_empty() {
                    d.name = token.clone();
                } else if token == "{" {
                    state = State::Version;
                } else {
                    return Err(SdlError::UnexpectedAfterStatedesc(token.clone()));
                }
            }
            State::Version => {
                let d = desc.as_mut().expect("descriptor started");
                if token.eq_ignore_ascii_case("version") {
                    continue;
                }
                d.version = token.parse().map_err(|_| SdlError::InvalidVersion {
                    descriptor: d.name.clone(),
                    token: token.clone(),
                })?;
                state = State::Variable;
            }
            State::Variable => {
                let ltok = token.to_ascii_lowercase();
                if ltok == "var" {
                    if let Some(v) = var.take() {
                        desc.as_mut().expect("descriptor started").variables.push(v);
                    }
                    var = Some(Variable {
                        var_type: VariableType::Int32,
                        descriptor: None,
                        name: String::new(),
                        range: None,
                    });
                    state = State::VariableType;
                } else if ltok == "default" || ltok == "defaultoption" {
                    state = State::VariableDefault;
                } else if token == "}" {
                    if let Some(v) = var.take() {
                        desc.as_mut().expect("descriptor started").variables.push(v);
                    }
                    descriptors.push(desc.take().expect("descriptor started"));
                    state = State::Invalid;
                }
                // Anything else inside a VAR body after the range bracket is
                // tolerated and skipped until the next VAR or closing brace.
            }
            State::VariableType => {
                let d = desc.as_ref().expect("descriptor started");
                let v = var.as_mut().expect("var started");
                if let Some(name) = token.strip_prefix('$') {
                    v.var_type = VariableType::Descriptor;
                    v.descriptor = Some(name.to_string());
                } else if let Some(t) = lookup_variable_type(token) {
                    v.var_type = t;
                } else {
                    return Err(SdlError::UnknownVariableType {
                        descriptor: d.name.clone(),
                        version: d.version,
                        token: token.clone(),
                    });
                }
                state = State::VariableName;
            }
            State::VariableName => {
                var.as_mut().expect("var started").name = token.clone();
                state = State::VariableRange;
            }
            State::VariableRange => {
                if token == "[" {
                    continue;
                } else if token == "]" {
                    state = State::Variable;
                } else {
                    let d = desc.as_ref().expect("descriptor started");
                    let v = var.as_mut().expect("var started");
                    v.range = Some(token.parse().map_err(|_| SdlError::InvalidRange {
                        descriptor: d.name.clone(),
                        version: d.version,
                        variable: v.name.clone(),
                        token: token.clone(),
                    })?);
                }
            }
            State::VariableDefault => {
                // Lazily skip DEFAULT/DEFAULTOPTION payloads; resume at the
                // next VAR or closing brace.
                state = State::Variable;
            }
        }
    }

    if state != State::Invalid {
        return Err(SdlError::UnexpectedEof);
    }

    Ok(descriptors)
}

/// Owns every `STATEDESC` loaded from one or more files, keyed by the file
/// they came from so the resolver can stage the right asset for a
/// dependency.
#[derive(Debug, Clone, Default)]
pub struct Manager {
    /// Descriptors loaded so far, in load order.
    pub descriptors: Vec<Descriptor>,
}

impl Manager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` and append its descriptors.
    pub fn read_descriptors(&mut self, text: &str) -> Result<()> {
        self.descriptors.extend(parse_descriptors(text)?);
        Ok(())
    }

    /// Load descriptors from a single SDL file on disk. Fails if the file
    /// carries a recognized encryption header; SDL files consumed here must
    /// always be plain.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read(path)?;
        let mut head = [0u8; 16];
        let avail = raw.len().min(16);
        head[..avail].copy_from_slice(&raw[..avail]);
        if dni_crypto::detect(&head) != dni_crypto::Encryption::Unspecified {
            return Err(SdlError::UnexpectedEncryption);
        }
        let text = String::from_utf8(raw)?;
        let before = self.descriptors.len();
        self.read_descriptors(&text)?;
        for d in &mut self.descriptors[before..] {
            d.source = Some(path.to_path_buf());
        }
        Ok(())
    }

    /// Whether any descriptor named `name` (case-insensitive) has been
    /// loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.iter().any(|d| d.name == name)
    }

    /// All descriptors matching `name`, case-insensitively. Warns via
    /// `tracing` on a case mismatch, matching the original's lookup
    /// leniency.
    pub fn find_descriptors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Descriptor> {
        self.descriptors.iter().filter(move |d| {
            if d.name.eq_ignore_ascii_case(name) {
                if d.name != name {
                    tracing::warn!(
                        requested = name,
                        actual = %d.name,
                        "matching SDL request to differently-cased descriptor"
                    );
                }
                true
            } else {
                false
            }
        })
    }

    /// The newest-versioned descriptor matching `name`, if any.
    pub fn find_descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.find_descriptors(name)
            .fold(None, |best: Option<&Descriptor>, candidate| match best {
                Some(b) if b.version >= candidate.version => Some(b),
                _ => Some(candidate),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_statedesc() {
        let text = "STATEDESC standardStage\n{\n VERSION 3\n VAR STRING32 name[1]\n VAR BOOL isAttached[1]\n}\n";
        let descs = parse_descriptors(text).unwrap();
        assert_eq!(descs.len(), 1);
        let d = &descs[0];
        assert_eq!(d.name, "standardStage");
        assert_eq!(d.version, 3);
        assert_eq!(d.variables.len(), 2);
        assert_eq!(d.variables[0].name, "name");
        assert!(matches!(d.variables[0].var_type, VariableType::String));
        assert_eq!(d.variables[0].range, Some(1));
        assert_eq!(d.variables[1].name, "isAttached");
        assert!(matches!(d.variables[1].var_type, VariableType::Bool));
    }

    #[test]
    fn embedded_descriptor_variable_has_unbounded_range() {
        let text = "STATEDESC genericBrain {\n VERSION 1\n VAR $standardStage stages[]\n}\n";
        let descs = parse_descriptors(text).unwrap();
        let var = &descs[0].variables[0];
        assert!(matches!(var.var_type, VariableType::Descriptor));
        assert_eq!(var.descriptor.as_deref(), Some("standardStage"));
        assert_eq!(var.range, None);
    }

    #[test]
    fn strips_line_and_block_comments() {
        let text = "// leading comment\nSTATEDESC foo /* inline */ {\n# another comment\nVERSION 1\n}\n";
        let descs = parse_descriptors(text).unwrap();
        assert_eq!(descs[0].name, "foo");
    }

    #[test]
    fn skips_default_and_defaultoption_clauses() {
        let text = "STATEDESC foo {\nVERSION 1\nVAR INT bar[1] DEFAULT 5\nVAR BOOL baz[1] DEFAULTOPTION hidden\n}\n";
        let descs = parse_descriptors(text).unwrap();
        assert_eq!(descs[0].variables.len(), 2);
    }

    #[test]
    fn manager_find_descriptor_prefers_newest_version() {
        let mut mgr = Manager::new();
        mgr.read_descriptors("STATEDESC foo {\nVERSION 1\n}\n").unwrap();
        mgr.read_descriptors("STATEDESC foo {\nVERSION 3\n}\n").unwrap();
        mgr.read_descriptors("STATEDESC foo {\nVERSION 2\n}\n").unwrap();
        assert_eq!(mgr.find_descriptor("foo").unwrap().version, 3);
    }

    #[test]
    fn manager_lookup_is_case_insensitive() {
        let mut mgr = Manager::new();
        mgr.read_descriptors("STATEDESC Foo {\nVERSION 1\n}\n").unwrap();
        assert!(mgr.find_descriptor("foo").is_some());
    }

    #[test]
    fn unexpected_token_at_top_level_errors() {
        assert!(parse_descriptors("not a statedesc").is_err());
    }

    #[test]
    fn truncated_file_is_an_error() {
        assert!(parse_descriptors("STATEDESC foo {\nVERSION 1\nVAR INT bar[1]").is_err());
    }
}
