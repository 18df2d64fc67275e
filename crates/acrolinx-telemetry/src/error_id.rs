//! Support reference ids for error log entries
//!
//! Ids are six digits drawn from 1-9, so they never start with or contain a
//! zero and always render with the same width.

use rand::RngExt;
use std::collections::{HashSet, VecDeque};

pub const ERROR_ID_LENGTH: u32 = 6;

/// Ids remembered for uniqueness. Far below the 9^6 possible ids, so a free
/// id is always found after a few draws.
pub const MAX_TRACKED_IDS: usize = 10_000;

/// Generates ids that are unique among the last `MAX_TRACKED_IDS` handed out,
/// or since `reset`.
#[derive(Debug, Default)]
pub struct ErrorIdGenerator {
    generated: VecDeque<u32>,
    seen: HashSet<u32>,
}

impl ErrorIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self) -> u32 {
        if self.generated.len() >= MAX_TRACKED_IDS
            && let Some(oldest) = self.generated.pop_front()
        {
            self.seen.remove(&oldest);
        }
        loop {
            let id = random_id();
            if self.seen.insert(id) {
                self.generated.push_back(id);
                return id;
            }
        }
    }

    pub fn generate_string(&mut self) -> String {
        self.generate().to_string()
    }

    pub fn reset(&mut self) {
        self.generated.clear();
        self.seen.clear();
    }

    /// Tracked ids, oldest first.
    pub fn generated_ids(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.generated.iter().copied()
    }
}

fn random_id() -> u32 {
    let mut rng = rand::rng();
    (0..ERROR_ID_LENGTH).fold(0, |acc, _| acc * 10 + rng.random_range(1..=9u32))
}
