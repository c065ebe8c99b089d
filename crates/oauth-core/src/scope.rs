//! Scope sets.
//!
//! Scopes travel as a space-delimited string on the wire and as an ordered,
//! de-duplicated list in memory. Order follows the order of first mention so
//! that a narrowed grant reads the same way the client asked for it.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Scopes(Vec<String>);

impl Scopes {
    /// Parse a space-delimited scope string. Empty segments are dropped.
    pub fn parse(raw: &str) -> Self {
        raw.split_whitespace().map(str::to_string).collect()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Scopes from `self` that are also in `allowed`, in `self`'s order.
    pub fn intersect(&self, allowed: &Scopes) -> Scopes {
        self.0
            .iter()
            .filter(|s| allowed.contains(s))
            .cloned()
            .collect()
    }

    /// True if every scope in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Scopes) -> bool {
        self.0.iter().all(|s| other.contains(s))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Display for Scopes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for Scopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut scopes: Vec<String> = Vec::new();
        for scope in iter {
            let scope = scope.into();
            if !scope.is_empty() && !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Self(scopes)
    }
}

impl From<Vec<String>> for Scopes {
    fn from(scopes: Vec<String>) -> Self {
        scopes.into_iter().collect()
    }
}

impl From<Scopes> for Vec<String> {
    fn from(scopes: Scopes) -> Self {
        scopes.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_blanks_and_duplicates() {
        let scopes = Scopes::parse("  read  write read ");
        assert_eq!(scopes.to_string(), "read write");
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn test_intersect_keeps_request_order() {
        let requested = Scopes::parse("write read admin");
        let allowed = Scopes::parse("read write");
        assert_eq!(requested.intersect(&allowed).to_string(), "write read");
    }

    #[test]
    fn test_intersect_with_no_overlap_is_empty() {
        let requested = Scopes::parse("admin");
        let allowed = Scopes::parse("read");
        assert!(requested.intersect(&allowed).is_empty());
    }

    #[test]
    fn test_subset() {
        let allowed = Scopes::parse("read write");
        assert!(Scopes::parse("read").is_subset_of(&allowed));
        assert!(!Scopes::parse("read admin").is_subset_of(&allowed));
        assert!(Scopes::default().is_subset_of(&allowed));
    }
}
