//! Mailbox listing and status types.

use super::{Uid, UidValidity};

/// Special-use role advertised in a LIST response (RFC 6154).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialUse {
    /// `\Archive`
    Archive,
    /// `\Drafts`
    Drafts,
    /// `\Junk`
    Junk,
    /// `\Sent`
    Sent,
    /// `\Trash`
    Trash,
}

/// One mailbox from a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    /// Full hierarchical name.
    pub path: String,
    /// Hierarchy delimiter, if the server uses one.
    pub delimiter: Option<String>,
    /// False when the server flags the entry `\Noselect`.
    pub selectable: bool,
    /// Special-use role, if advertised.
    pub special_use: Option<SpecialUse>,
}

impl MailboxInfo {
    /// Creates a selectable mailbox entry with no special use.
    #[must_use]
    pub fn new(path: impl Into<String>, delimiter: Option<&str>) -> Self {
        Self {
            path: path.into(),
            delimiter: delimiter.map(str::to_string),
            selectable: true,
            special_use: None,
        }
    }

    /// Returns the last path segment.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        match self.delimiter.as_deref() {
            Some(delim) if !delim.is_empty() => {
                self.path.rsplit(delim).next().unwrap_or(&self.path)
            }
            _ => &self.path,
        }
    }
}

/// Mailbox state reported by STATUS, SELECT or EXAMINE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_name_uses_delimiter() {
        let info = MailboxInfo::new("Work/Projects/2024", Some("/"));
        assert_eq!(info.leaf_name(), "2024");

        let dotted = MailboxInfo::new("INBOX.Archive", Some("."));
        assert_eq!(dotted.leaf_name(), "Archive");
    }

    #[test]
    fn leaf_name_without_delimiter() {
        let info = MailboxInfo::new("INBOX", None);
        assert_eq!(info.leaf_name(), "INBOX");
        assert!(info.selectable);
    }
}
