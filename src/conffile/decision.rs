// src/conffile/decision.rs

//! What to do with one conffile, before anyone is asked
//!
//! Two questions decide it: has the user changed the file since we last
//! recorded its hash, and has the distributor? Neither or only the user:
//! keep. Only the distributor: install. Both: ask, suggesting keep.

use crate::pkg::{NEW_CONFFILE_HASH, NONEXISTENT_HASH};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave the live file, discard `.dpkg-new`
    Keep,
    /// Replace the live file with `.dpkg-new`
    Install,
    /// The live file does not exist; move `.dpkg-new` into place
    NewConffile,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Keep => "keep",
            Action::Install => "install",
            Action::NewConffile => "newconffile",
        })
    }
}

/// Outcome of classifying a conffile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Action to take, or the suggested default when `prompt` is set
    pub action: Action,
    pub prompt: bool,
    /// Keep the losing version as `.dpkg-old` / `.dpkg-dist`
    pub backup: bool,
    /// Never recorded before, yet the live file exists
    pub is_new: bool,
    /// The user deleted the live file
    pub user_removed: bool,
    pub user_edited: bool,
    pub dist_edited: bool,
}

impl Decision {
    fn new(action: Action) -> Self {
        Self {
            action,
            prompt: false,
            backup: false,
            is_new: false,
            user_removed: false,
            user_edited: false,
            dist_edited: false,
        }
    }

    /// Base decision from the edited flags alone
    pub fn from_table(user_edited: bool, dist_edited: bool) -> Self {
        let mut decision = match (user_edited, dist_edited) {
            (false, false) => Self::new(Action::Keep),
            (false, true) => Self::new(Action::Install),
            (true, false) => Self::new(Action::Keep),
            (true, true) => Self {
                prompt: true,
                ..Self::new(Action::Keep)
            },
        };
        decision.user_edited = user_edited;
        decision.dist_edited = dist_edited;
        decision
    }
}

/// Classify a conffile from its three hashes
///
/// `stored` is the hash recorded at the last configuration, `current` the
/// live file's, `new` the `.dpkg-new` candidate's.
pub fn decide(stored: &str, current: &str, new: &str, force_confmiss: bool) -> Decision {
    if current == new {
        return Decision::new(Action::Keep);
    }

    if current == NONEXISTENT_HASH && force_confmiss {
        return Decision::new(Action::NewConffile);
    }

    if stored == NEW_CONFFILE_HASH {
        if current == NONEXISTENT_HASH {
            return Decision::new(Action::NewConffile);
        }
        return Decision {
            is_new: true,
            ..Decision::from_table(true, true)
        };
    }

    let mut decision = Decision::from_table(stored != current, stored != new);
    if current == NONEXISTENT_HASH {
        decision.user_removed = true;
    }
    decision
}
