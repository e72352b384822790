//! Preset atom parsing.
//!
//! Presets are stored in the configuration as slash-separated option atoms,
//! exactly the syntax of the URL options segment. They are shape-checked at
//! startup and expanded in place by the URL parser.

/// One option atom: a name plus its colon-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlOption {
    pub name: String,
    pub args: Vec<String>,
}

impl UrlOption {
    /// Split a `name:arg1:arg2` atom. An atom without a colon has no args.
    pub fn parse(atom: &str) -> Result<UrlOption, String> {
        let mut parts = atom.split(':');
        let name = parts.next().unwrap_or("").to_string();
        if name.is_empty() {
            return Err(format!("option atom has no name: {:?}", atom));
        }
        Ok(UrlOption {
            name,
            args: parts.map(str::to_string).collect(),
        })
    }
}

/// Parse a preset value (`resizing_type:fill/blur:0.2`) into atoms.
pub fn parse_preset_atoms(value: &str) -> Result<Vec<UrlOption>, String> {
    value
        .split('/')
        .filter(|s| !s.is_empty())
        .map(UrlOption::parse)
        .collect()
}
