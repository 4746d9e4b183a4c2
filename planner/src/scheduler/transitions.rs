//! Slew and setup time between consecutive targets.

use std::collections::HashMap;

use chrono::Duration;

use crate::config::TransitionOverride;

/// `(from, to) -> duration`, with a default for pairs not listed.
///
/// Staying on the same target costs nothing unless listed explicitly; the
/// first block of the night has no predecessor and costs nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransitionTable {
    default: Duration,
    pairs: HashMap<(String, String), Duration>,
}

impl TransitionTable {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            pairs: HashMap::new(),
        }
    }

    pub fn from_settings(default_seconds: u64, overrides: &[TransitionOverride]) -> Self {
        let mut table = Self::new(Duration::seconds(default_seconds as i64));
        for o in overrides {
            table.insert(&o.from, &o.to, Duration::seconds(o.seconds as i64));
        }
        table
    }

    pub fn insert(&mut self, from: &str, to: &str, duration: Duration) {
        self.pairs.insert((from.to_string(), to.to_string()), duration);
    }

    pub fn default_duration(&self) -> Duration {
        self.default
    }

    pub fn lookup(&self, from: Option<&str>, to: &str) -> Duration {
        let Some(from) = from else {
            return Duration::zero();
        };
        match self.pairs.get(&(from.to_string(), to.to_string())) {
            Some(d) => *d,
            None if from == to => Duration::zero(),
            None => self.default,
        }
    }
}
