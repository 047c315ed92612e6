//! Credential rotation for the oracle client.
//!
//! Each key is either available or cooling down until a fixed instant. Time is
//! passed in by the caller so the state machine stays deterministic.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Available,
    CoolingDown { ready_at: Instant },
}

#[derive(Debug, Clone)]
pub struct KeyPool {
    keys: Vec<String>,
    states: Vec<KeyState>,
    current: usize,
    cooldown: Duration,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Self {
        let states = vec![KeyState::Available; keys.len()];
        Self {
            keys,
            states,
            current: 0,
            cooldown,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<KeyState> {
        self.states.get(index).copied()
    }

    /// Next usable key, starting from the current one.
    ///
    /// Keys whose cool-down has elapsed at `now` become available again.
    pub fn acquire(&mut self, now: Instant) -> Option<(usize, &str)> {
        for state in &mut self.states {
            if let KeyState::CoolingDown { ready_at } = *state
                && ready_at <= now
            {
                *state = KeyState::Available;
            }
        }
        let len = self.keys.len();
        let index = (0..len)
            .map(|offset| (self.current + offset) % len)
            .find(|&idx| self.states[idx] == KeyState::Available)?;
        self.current = index;
        Some((index, self.keys[index].as_str()))
    }

    /// Put a rejected key on cool-down and rotate past it.
    pub fn mark_rejected(&mut self, index: usize, now: Instant) {
        let Some(state) = self.states.get_mut(index) else {
            return;
        };
        *state = KeyState::CoolingDown {
            ready_at: now + self.cooldown,
        };
        if !self.keys.is_empty() {
            self.current = (index + 1) % self.keys.len();
        }
    }
}

/// Mask a credential for logs: first and last four characters only.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
