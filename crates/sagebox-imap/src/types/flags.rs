//! Message flags.

use std::collections::BTreeSet;

/// A persistent message flag.
///
/// `\Recent` is session-specific and has no variant; it is
/// dropped when server responses are converted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Custom keyword flag.
    Keyword(String),
}

impl Flag {
    /// Parses a flag atom. Returns `None` for `\Recent` and empty input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let flag = match s.to_uppercase().as_str() {
            "" | "\\RECENT" => return None,
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            _ => Self::Keyword(s.to_string()),
        };
        Some(flag)
    }

    /// Returns the flag as an IMAP atom.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Keyword(s) => s,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of message flags.
///
/// Equality ignores the order in which the server listed the flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Flags {
    flags: BTreeSet<Flag>,
}

impl Flags {
    /// Creates an empty flag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a space-separated list of flag atoms.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        s.split_whitespace().filter_map(Flag::parse).collect()
    }

    /// Adds a flag.
    pub fn insert(&mut self, flag: Flag) {
        self.flags.insert(flag);
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.remove(flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Returns true if the message is flagged.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.contains(&Flag::Flagged)
    }

    /// Returns an iterator over the flags in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Formats the set as a parenthesized IMAP flag list, e.g. `(\Seen $Work)`.
    #[must_use]
    pub fn to_list(&self) -> String {
        format!("({self})")
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let atoms: Vec<&str> = self.flags.iter().map(Flag::as_str).collect();
        write!(f, "{}", atoms.join(" "))
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::collections::btree_set::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}
