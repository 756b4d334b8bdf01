//! # Vote Engine
//!
//! Votes are not stored as records. A vote is membership of a user id in
//! either the `up` or the `down` set of a single entity, and [`VoteTally::cast`]
//! is the only way to change that membership.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Where a given user currently stands on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    #[default]
    Neutral,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub new_score: i64,
    pub user_state: VoteState,
}

/// The two vote sets of one entity.
///
/// Both sets keep insertion order and never contain duplicates, and a user
/// id is never present in both at once. Deserialization rejects payloads
/// that break either rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TallyParts", into = "TallyParts")]
pub struct VoteTally {
    up: Vec<UserId>,
    down: Vec<UserId>,
}

#[derive(Serialize, Deserialize)]
struct TallyParts {
    #[serde(default)]
    up: Vec<UserId>,
    #[serde(default)]
    down: Vec<UserId>,
}

impl TryFrom<TallyParts> for VoteTally {
    type Error = AppError;

    fn try_from(parts: TallyParts) -> Result<Self> {
        Self::new(parts.up, parts.down)
    }
}

impl From<VoteTally> for TallyParts {
    fn from(tally: VoteTally) -> Self {
        Self { up: tally.up, down: tally.down }
    }
}

impl VoteTally {
    pub fn new(up: Vec<UserId>, down: Vec<UserId>) -> Result<Self> {
        let mut ups = HashSet::with_capacity(up.len());
        for user in &up {
            if !ups.insert(user) {
                return Err(AppError::validation(format!("duplicate up vote by {user}")));
            }
        }
        let mut downs = HashSet::with_capacity(down.len());
        for user in &down {
            if ups.contains(user) {
                return Err(AppError::validation(format!("{user} voted both up and down")));
            }
            if !downs.insert(user) {
                return Err(AppError::validation(format!("duplicate down vote by {user}")));
            }
        }
        Ok(Self { up, down })
    }

    pub fn up(&self) -> &[UserId] {
        &self.up
    }

    pub fn down(&self) -> &[UserId] {
        &self.down
    }

    /// `|up| - |down|`. Never stored, always derived.
    pub fn score(&self) -> i64 {
        self.up.len() as i64 - self.down.len() as i64
    }

    pub fn state_of(&self, user: &UserId) -> VoteState {
        if self.up.contains(user) {
            VoteState::Up
        } else if self.down.contains(user) {
            VoteState::Down
        } else {
            VoteState::Neutral
        }
    }

    /// Applies one vote action by `user`.
    ///
    /// Repeating the user's current direction withdraws the vote; voting the
    /// other way moves the user across. Two identical casts in a row leave the
    /// user neutral.
    pub fn cast(&mut self, user: &UserId, direction: VoteDirection) -> VoteOutcome {
        let (same, opposite) = match direction {
            VoteDirection::Up => (&mut self.up, &mut self.down),
            VoteDirection::Down => (&mut self.down, &mut self.up),
        };

        let user_state = if let Some(pos) = same.iter().position(|u| u == user) {
            same.remove(pos);
            VoteState::Neutral
        } else {
            opposite.retain(|u| u != user);
            same.push(user.clone());
            match direction {
                VoteDirection::Up => VoteState::Up,
                VoteDirection::Down => VoteState::Down,
            }
        };

        VoteOutcome {
            new_score: self.score(),
            user_state,
        }
    }
}
