//! Parsing of networked var type strings.

use std::fmt;

use crate::error::{SchemaError, SchemaResult};

/// Array bounds spelled as engine constants rather than numbers.
const NAMED_COUNTS: &[(&str, usize)] = &[
    ("MAX_ITEM_STOCKS", 8),
    ("MAX_ABILITY_DRAFT_ABILITIES", 48),
];

/// A parsed var type such as `uint8[4]`, `CHandle< CBaseEntity >` or
/// `CBodyComponent*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarType {
    pub base: String,
    pub generic: Option<Box<VarType>>,
    pub pointer: bool,
    /// Fixed element count; `None` when absent or spelled with an unknown
    /// constant.
    pub count: Option<usize>,
}

impl VarType {
    /// Parses a var type string.
    pub fn parse(text: &str) -> SchemaResult<Self> {
        let invalid = || SchemaError::InvalidVarType {
            text: text.to_owned(),
        };
        let text = text.trim();
        let base_end = text.find(['<', '[', '*']).unwrap_or(text.len());
        let base = text[..base_end].trim();
        if base.is_empty() {
            return Err(invalid());
        }
        let mut rest = text[base_end..].trim_start();

        let mut generic = None;
        if rest.starts_with('<') {
            let close = matching_angle(rest).ok_or_else(invalid)?;
            generic = Some(Box::new(Self::parse(&rest[1..close])?));
            rest = rest[close + 1..].trim_start();
        }

        let pointer = rest.starts_with('*');
        if pointer {
            rest = rest[1..].trim_start();
        }

        let mut count = None;
        if let Some(inner) = rest.strip_prefix('[') {
            let close = inner.find(']').ok_or_else(invalid)?;
            let spelled = inner[..close].trim();
            count = spelled.parse::<usize>().ok().or_else(|| {
                NAMED_COUNTS
                    .iter()
                    .find(|(name, _)| *name == spelled)
                    .map(|(_, value)| *value)
            });
            rest = inner[close + 1..].trim_start();
        }

        if !rest.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            base: base.to_owned(),
            generic,
            pointer,
            count,
        })
    }
}

/// Index of the `>` closing the `<` at the start of `text`.
fn matching_angle(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(generic) = &self.generic {
            write!(f, "< {generic} >")?;
        }
        if self.pointer {
            write!(f, "*")?;
        }
        if let Some(count) = self.count {
            write!(f, "[{count}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let t = VarType::parse("int32").unwrap();
        assert_eq!(t.base, "int32");
        assert!(t.generic.is_none());
        assert!(!t.pointer);
        assert_eq!(t.count, None);
    }

    #[test]
    fn fixed_array() {
        let t = VarType::parse("uint8[4]").unwrap();
        assert_eq!(t.base, "uint8");
        assert_eq!(t.count, Some(4));
    }

    #[test]
    fn named_count() {
        let t = VarType::parse("int32[MAX_ITEM_STOCKS]").unwrap();
        assert_eq!(t.count, Some(8));
        let unknown = VarType::parse("int32[SOME_LIMIT]").unwrap();
        assert_eq!(unknown.count, None);
    }

    #[test]
    fn nested_generic() {
        let t = VarType::parse("CNetworkUtlVectorBase< CHandle< CBaseEntity > >").unwrap();
        assert_eq!(t.base, "CNetworkUtlVectorBase");
        let inner = t.generic.unwrap();
        assert_eq!(inner.base, "CHandle");
        assert_eq!(inner.generic.unwrap().base, "CBaseEntity");
    }

    #[test]
    fn pointer() {
        let t = VarType::parse("CBodyComponent*").unwrap();
        assert_eq!(t.base, "CBodyComponent");
        assert!(t.pointer);
    }

    #[test]
    fn malformed() {
        assert!(VarType::parse("").is_err());
        assert!(VarType::parse("CHandle< int").is_err());
        assert!(VarType::parse("int32[4").is_err());
    }

    #[test]
    fn display_roundtrip() {
        let text = "CUtlVector< CHandle< CBaseEntity > >";
        assert_eq!(VarType::parse(text).unwrap().to_string(), text);
    }
}
