//! Branch-listing helpers shared by the inspector, verifier, planner and decider.

use std::fmt;

/// Sentinel reported when `HEAD` is not on a named branch.
pub const DETACHED: &str = "HEAD (detached)";
/// Sentinel reported when no line is marked as checked out.
pub const UNKNOWN: &str = "unknown";

/// Branch currently checked out, as read from `git branch` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentBranch {
    Named(String),
    Detached,
    Unknown,
}

impl CurrentBranch {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Detached | Self::Unknown => None,
        }
    }

    pub fn is(&self, branch: &str) -> bool {
        self.name() == Some(branch)
    }
}

impl fmt::Display for CurrentBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Detached => f.write_str(DETACHED),
            Self::Unknown => f.write_str(UNKNOWN),
        }
    }
}

/// Find the line marked `*` in a `git branch` listing.
///
/// A parenthesized name (`* (HEAD detached at 1a2b3c)`) means detached `HEAD`.
/// Empty or unmarked input yields [`CurrentBranch::Unknown`].
pub fn current_branch(listing: &str) -> CurrentBranch {
    for line in listing.lines() {
        let Some(rest) = line.trim().strip_prefix('*') else {
            continue;
        };
        let name = rest.trim();
        if name.starts_with('(') {
            return CurrentBranch::Detached;
        }
        if name.is_empty() {
            continue;
        }
        return CurrentBranch::Named(name.to_string());
    }
    CurrentBranch::Unknown
}

/// All local branch names in a `git branch` listing, in listing order.
///
/// Detached-head pseudo entries and worktree markers (`+`) are handled; error
/// text (`Error: ...`) yields no names.
pub fn branch_names(listing: &str) -> Vec<String> {
    if listing.trim_start().starts_with("Error:") {
        return Vec::new();
    }
    listing
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let name = trimmed
                .strip_prefix('*')
                .or_else(|| trimmed.strip_prefix('+'))
                .unwrap_or(trimmed)
                .trim();
            if name.is_empty() || name.starts_with('(') {
                return None;
            }
            // `git branch -v` appends the short sha and subject after the name.
            name.split_whitespace().next().map(str::to_string)
        })
        .collect()
}

/// Pick a branch to move to before deleting `leaving`.
///
/// Prefers `main`, then `master`, then the first other listed branch.
pub fn safe_branch(listing: &str, leaving: &str) -> Option<String> {
    let names = branch_names(listing);
    for preferred in ["main", "master"] {
        if preferred != leaving && names.iter().any(|n| n == preferred) {
            return Some(preferred.to_string());
        }
    }
    names.into_iter().find(|name| name != leaving)
}
