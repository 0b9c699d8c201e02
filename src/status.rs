use rand::seq::SliceRandom;
use rand::Rng;

use crate::platform::{ActivityKind, StatusLine};

const ACTIVITIES: [ActivityKind; 4] = [
    ActivityKind::Playing,
    ActivityKind::Listening,
    ActivityKind::Watching,
    ActivityKind::Competing,
];

/// Cycles through a bot's status lines in order.
#[derive(Debug, Clone)]
pub struct StatusRotator {
    lines: Vec<String>,
    next: usize,
    random_activity: bool,
}

impl StatusRotator {
    /// `random_activity` picks a fresh activity kind for every line;
    /// otherwise every line is shown as "Playing".
    pub fn new(lines: Vec<String>, random_activity: bool) -> Self {
        Self {
            lines,
            next: 0,
            random_activity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn next_line<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<StatusLine> {
        if self.lines.is_empty() {
            return None;
        }
        let text = self.lines[self.next].clone();
        self.next = (self.next + 1) % self.lines.len();
        let activity = if self.random_activity {
            *ACTIVITIES.choose(rng).unwrap_or(&ActivityKind::Playing)
        } else {
            ActivityKind::Playing
        };
        Some(StatusLine { text, activity })
    }
}
