//! Bookmark entity kinds and toggle semantics.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest note accepted on a bookmark, in characters.
pub const MAX_NOTE_LEN: usize = 5_000;

/// What a bookmark points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Grant,
    Recipient,
    Institute,
    Search,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Grant,
        EntityKind::Recipient,
        EntityKind::Institute,
        EntityKind::Search,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Recipient => "recipient",
            Self::Institute => "institute",
            Self::Search => "search",
        }
    }

    /// Join table holding this kind's bookmarks.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Grant => "bookmarked_grants",
            Self::Recipient => "bookmarked_recipients",
            Self::Institute => "bookmarked_institutes",
            Self::Search => "bookmarked_searches",
        }
    }

    /// Foreign-key column in [`table`](Self::table).
    pub fn id_column(&self) -> &'static str {
        match self {
            Self::Grant => "grant_id",
            Self::Recipient => "recipient_id",
            Self::Institute => "institute_id",
            Self::Search => "history_id",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = Error;

    /// Accepts singular and plural forms (`grant`, `grants`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let singular = s.strip_suffix('s').unwrap_or(&s);
        match singular {
            "grant" => Ok(Self::Grant),
            "recipient" => Ok(Self::Recipient),
            "institute" => Ok(Self::Institute),
            "search" | "searche" => Ok(Self::Search),
            _ => Err(Error::InvalidInput(format!("unknown bookmark type: {s}"))),
        }
    }
}

/// Mutation implied by a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Add,
    Remove,
}

impl ToggleAction {
    /// The client sends the state it currently displays. A bookmarked entity
    /// gets removed, anything else gets added. Replaying the same request is
    /// harmless since removal of a missing row and insertion of an existing
    /// one are both no-ops.
    pub fn from_current_state(is_bookmarked: bool) -> Self {
        if is_bookmarked {
            Self::Remove
        } else {
            Self::Add
        }
    }

    /// State after the action has been applied.
    pub fn resulting_state(&self) -> bool {
        matches!(self, Self::Add)
    }
}

/// Trim a note and turn blank notes into `None`.
pub fn normalize_note(note: Option<&str>) -> Result<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(Error::InvalidInput(format!(
            "note exceeds {MAX_NOTE_LEN} characters"
        )));
    }
    Ok(Some(note.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_kinds() {
        assert_eq!("grant".parse::<EntityKind>().unwrap(), EntityKind::Grant);
        assert_eq!("Grants".parse::<EntityKind>().unwrap(), EntityKind::Grant);
        assert_eq!(
            "institutes".parse::<EntityKind>().unwrap(),
            EntityKind::Institute
        );
        assert_eq!("searches".parse::<EntityKind>().unwrap(), EntityKind::Search);
        assert!("program".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_each_kind_has_its_own_table() {
        let tables: HashSet<&str> = EntityKind::ALL.iter().map(|k| k.table()).collect();
        assert_eq!(tables.len(), EntityKind::ALL.len());
    }

    /// Models the join table as a set of (user, entity) pairs.
    fn apply(set: &mut HashSet<(u32, i64)>, user: u32, entity: i64, is_bookmarked: bool) -> bool {
        match ToggleAction::from_current_state(is_bookmarked) {
            ToggleAction::Add => {
                set.insert((user, entity));
            }
            ToggleAction::Remove => {
                set.remove(&(user, entity));
            }
        }
        set.contains(&(user, entity))
    }

    #[test]
    fn test_toggle_is_idempotent_per_pair() {
        let mut set = HashSet::new();

        assert!(apply(&mut set, 1, 42, false));
        assert!(apply(&mut set, 1, 42, false));
        assert_eq!(set.len(), 1);

        assert!(!apply(&mut set, 1, 42, true));
        assert!(!apply(&mut set, 1, 42, true));
        assert!(set.is_empty());
    }

    #[test]
    fn test_toggle_is_scoped_to_user() {
        let mut set = HashSet::new();
        apply(&mut set, 1, 42, false);
        apply(&mut set, 2, 42, false);
        apply(&mut set, 1, 42, true);
        assert!(set.contains(&(2, 42)));
        assert!(!set.contains(&(1, 42)));
    }

    #[test]
    fn test_resulting_state_matches_action() {
        assert!(ToggleAction::from_current_state(false).resulting_state());
        assert!(!ToggleAction::from_current_state(true).resulting_state());
    }

    #[test]
    fn test_normalize_note() {
        assert_eq!(normalize_note(None).unwrap(), None);
        assert_eq!(normalize_note(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_note(Some("  follow up ")).unwrap().as_deref(),
            Some("follow up")
        );
        let long = "x".repeat(MAX_NOTE_LEN + 1);
        assert!(normalize_note(Some(&long)).is_err());
    }
}
