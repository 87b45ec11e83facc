//! Entity URIs (§6: "canonical strings formed as `type:key[/childType:key]*`").
//!
//! No teacher equivalent (the teacher addresses state by session id alone);
//! grounded on the URL-engine's own grammar in SPEC_FULL.md, which treats a
//! `Uri` as the thing `query(url)` resolves down to and the thing a
//! `watch(url)` round-trips back out as `entity.uri()`.

use std::fmt;

/// A canonical, stable entity address. The empty `Uri` denotes the
/// `Debugger` root itself (the only entity with no `type:key` segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(String);

impl Uri {
    pub fn root() -> Self {
        Uri(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one `type:key` segment.
    pub fn child(&self, entity_type: &str, key: &str) -> Self {
        if self.0.is_empty() {
            Uri(format!("{entity_type}:{key}"))
        } else {
            Uri(format!("{}/{entity_type}:{key}", self.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(type, key)` segments, e.g. `session:a1/thread:2` ->
    /// `[("session","a1"), ("thread","2")]`.
    pub fn segments(&self) -> Vec<(&str, &str)> {
        if self.0.is_empty() {
            return Vec::new();
        }
        self.0
            .split('/')
            .filter_map(|seg| seg.split_once(':'))
            .collect()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_segments_chain_and_round_trip() {
        let uri = Uri::root().child("session", "a1").child("thread", "17");
        assert_eq!(uri.as_str(), "session:a1/thread:17");
        assert_eq!(uri.segments(), vec![("session", "a1"), ("thread", "17")]);
    }

    #[test]
    fn root_displays_as_a_single_slash() {
        assert_eq!(Uri::root().to_string(), "/");
    }
}
