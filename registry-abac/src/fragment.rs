//! C4: Fragment Path Grammar.
//!
//! A fragment is a dotted, array-aware path into a descriptor, written as
//! `$<root>#<seg>(.<seg>)*`, e.g. `$aasdesc#idShort` or
//! `$aasdesc#submodelDescriptors[].semanticId`. Only the root and the part
//! after `#` are handled here; the caller (the expression grammar) has
//! already split off the `$root#` prefix by the time a `Fragment` is parsed.

use std::fmt;

use thiserror::Error;

/// The five roots a fragment can be anchored at, one per descriptor kind
/// plus the bare `AAS`/`SM` identifiable trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentRoot {
    AasDesc,
    SmDesc,
    Bd,
    Sm,
    Aas,
}

impl FragmentRoot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentRoot::AasDesc => "aasdesc",
            FragmentRoot::SmDesc => "smdesc",
            FragmentRoot::Bd => "bd",
            FragmentRoot::Sm => "sm",
            FragmentRoot::Aas => "aas",
        }
    }
}

impl fmt::Display for FragmentRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("empty fragment path")]
    Empty,
    #[error("segment `{0}` is not a valid fragment segment")]
    InvalidSegment(String),
}

/// One dotted segment of a fragment, optionally marked as an array axis
/// with a trailing `[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub is_array: bool,
}

/// A fully parsed fragment: a root plus the dotted segment chain after `#`.
/// This is the unit the expression grammar stores inside `$attribute`
/// nodes for `AAS`/`SM`/`BD`/`SMDESC`/`AASDESC` references; SQL lowering
/// (C5) is the only consumer that needs to resolve it to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub root: FragmentRoot,
    pub segments: Vec<Segment>,
    /// The original `seg(.seg)*` text, kept for error messages and for use
    /// as a stable key in `MaskFlag`/collector bookkeeping.
    pub raw: String,
}

impl Fragment {
    /// Parse the part of a fragment after `<root>#`, e.g.
    /// `submodelDescriptors[].semanticId`.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentError`] if the path is empty or any segment is not
    /// a valid identifier (with an optional trailing `[]`).
    pub fn parse(root: FragmentRoot, path: &str) -> Result<Self, FragmentError> {
        if path.is_empty() {
            return Err(FragmentError::Empty);
        }

        let segments = path
            .split('.')
            .map(|raw_seg| {
                let (name, is_array) = match raw_seg.strip_suffix("[]") {
                    Some(name) => (name, true),
                    None => (raw_seg, false),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(FragmentError::InvalidSegment(raw_seg.to_string()));
                }
                Ok(Segment {
                    name: name.to_string(),
                    is_array,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            segments,
            raw: path.to_string(),
        })
    }

    /// A stable textual key identifying this fragment, e.g.
    /// `aasdesc#submodelDescriptors[].semanticId`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}#{}", self.root, self.raw)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_fragment() {
        let frag = Fragment::parse(FragmentRoot::AasDesc, "idShort").unwrap();
        assert_eq!(
            frag.segments,
            vec![Segment {
                name: "idShort".into(),
                is_array: false
            }]
        );
        assert_eq!(frag.key(), "aasdesc#idShort");
    }

    #[test]
    fn parses_array_segment() {
        let frag =
            Fragment::parse(FragmentRoot::AasDesc, "submodelDescriptors[].semanticId").unwrap();
        assert_eq!(
            frag.segments,
            vec![
                Segment {
                    name: "submodelDescriptors".into(),
                    is_array: true
                },
                Segment {
                    name: "semanticId".into(),
                    is_array: false
                }
            ]
        );
    }

    #[test]
    fn rejects_empty_path() {
        assert_eq!(
            Fragment::parse(FragmentRoot::Aas, ""),
            Err(FragmentError::Empty)
        );
    }

    #[test]
    fn rejects_invalid_segment() {
        assert_eq!(
            Fragment::parse(FragmentRoot::Aas, "foo.$bar"),
            Err(FragmentError::InvalidSegment("$bar".into()))
        );
    }
}
