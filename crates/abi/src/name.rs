//! Symbol names
//!
//! A [`SymbolName`] pairs a dotted full name (`dog.Woof`) with its short name
//! (`Woof`). The package is whatever precedes the short name.

use std::fmt;

use crate::codec::{ByteReader, ByteWriter, Decode, Encode};
use crate::error::{DecodeError, NameError};

/// Canonical/short name pair
///
/// Invariant: `full_name` equals `short_name` or ends with `.short_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolName {
    full_name: String,
    short_name: String,
}

impl SymbolName {
    /// Create a name, validating that `short_name` is the tail of `full_name`
    pub fn new(full_name: impl Into<String>, short_name: impl Into<String>) -> Result<Self, NameError> {
        let full_name = full_name.into();
        let short_name = short_name.into();

        let valid = full_name == short_name
            || full_name
                .strip_suffix(short_name.as_str())
                .is_some_and(|package| package.ends_with('.') && package.len() > 1);

        if !valid {
            return Err(NameError::SuffixMismatch {
                full_name,
                short_name,
            });
        }

        Ok(Self {
            full_name,
            short_name,
        })
    }

    /// Create a name whose short name is the last dotted segment
    pub fn from_full_name(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let short_name = match full_name.rfind('.') {
            Some(dot) => full_name[dot + 1..].to_string(),
            None => full_name.clone(),
        };
        Self {
            full_name,
            short_name,
        }
    }

    /// Rebuild a name from its mangled form (`dog_Woof` → `dog.Woof`)
    ///
    /// The last `_` separates the package segments from the short name.
    pub fn from_mangled(mangled: &str) -> Result<Self, NameError> {
        let separator = mangled
            .rfind('_')
            .ok_or_else(|| NameError::MissingSeparator(mangled.to_string()))?;

        let (package, short_name) = (&mangled[..separator], &mangled[separator + 1..]);
        if short_name.is_empty() {
            return Err(NameError::EmptyShortName(mangled.to_string()));
        }

        let full_name = if package.is_empty() {
            short_name.to_string()
        } else {
            format!("{}.{}", package.replace('_', "."), short_name)
        };

        Self::new(full_name, short_name)
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Full name without the trailing `.short_name`; empty at top level
    pub fn package_name(&self) -> &str {
        if self.full_name.len() == self.short_name.len() {
            ""
        } else {
            &self.full_name[..self.full_name.len() - self.short_name.len() - 1]
        }
    }

    /// Whether the symbol lives outside any package
    pub fn is_top_level(&self) -> bool {
        self.package_name().is_empty()
    }

    /// All dotted segments of the full name
    pub fn segments(&self) -> Vec<&str> {
        self.full_name.split('.').collect()
    }

    /// Dotted segments of the package; empty for top-level names
    pub fn package_segments(&self) -> Vec<&str> {
        match self.package_name() {
            "" => Vec::new(),
            package => package.split('.').collect(),
        }
    }

    /// Dotted segments of the short name
    pub fn name_segments(&self) -> Vec<&str> {
        self.short_name.split('.').collect()
    }

    /// Package segments joined with `_`, then `_`, then the short name
    pub fn mangled(&self) -> String {
        format!("{}_{}", self.package_segments().join("_"), self.short_name)
    }
}

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

impl Encode for SymbolName {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_str(&self.full_name);
        writer.write_str(&self.short_name);
    }
}

impl Decode for SymbolName {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let full_name = reader.read_string()?;
        let short_name = reader.read_string()?;
        Ok(Self::new(full_name, short_name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_decomposition() {
        let name = SymbolName::new("org.example.dog.Woof", "Woof").unwrap();
        assert_eq!(name.package_name(), "org.example.dog");
        assert_eq!(name.segments(), vec!["org", "example", "dog", "Woof"]);
        assert_eq!(name.package_segments(), vec!["org", "example", "dog"]);
        assert_eq!(name.name_segments(), vec!["Woof"]);
        assert!(!name.is_top_level());
    }

    #[test]
    fn test_top_level_name() {
        let name = SymbolName::new("Woof", "Woof").unwrap();
        assert_eq!(name.package_name(), "");
        assert!(name.package_segments().is_empty());
        assert!(name.is_top_level());
        assert_eq!(name.mangled(), "_Woof");
    }

    #[test]
    fn test_suffix_is_enforced() {
        assert!(SymbolName::new("dog.Woof", "Meow").is_err());
        // A suffix that is not a whole segment is rejected too
        assert!(SymbolName::new("dog.BigWoof", "Woof").is_err());
        assert!(SymbolName::new(".Woof", "Woof").is_err());
    }

    #[test]
    fn test_mangled_round_trip() {
        let name = SymbolName::new("fox.den.Ahhh", "Ahhh").unwrap();
        assert_eq!(name.mangled(), "fox_den_Ahhh");
        assert_eq!(SymbolName::from_mangled("fox_den_Ahhh").unwrap(), name);

        let top = SymbolName::from_full_name("Ahhh");
        assert_eq!(SymbolName::from_mangled(&top.mangled()).unwrap(), top);
    }

    #[test]
    fn test_from_mangled_errors() {
        assert_eq!(
            SymbolName::from_mangled("nounderscore"),
            Err(NameError::MissingSeparator("nounderscore".to_string()))
        );
        assert_eq!(
            SymbolName::from_mangled("dog_"),
            Err(NameError::EmptyShortName("dog_".to_string()))
        );
    }

    #[test]
    fn test_from_full_name() {
        let name = SymbolName::from_full_name("a.b.C");
        assert_eq!(name.short_name(), "C");
        assert_eq!(name.package_name(), "a.b");
    }
}
