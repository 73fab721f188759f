// ABOUTME: Resume schedule for a dropped gateway session.
// ABOUTME: Delays grow geometrically to a cap; the attempt count clears only once a session delivers frames.

use std::time::Duration;

/// How automatic resume spaces out its attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Attempts allowed before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ResumePolicy {
    /// Delay before the 1-based `attempt`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// One scheduled resume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeAttempt {
    pub number: u32,
    pub delay: Duration,
}

/// Resume attempts made since the last session that delivered a frame.
///
/// Opening a socket does not clear the count. Only `mark_healthy`, called
/// when a frame arrives, does.
#[derive(Debug)]
pub struct ResumeSchedule {
    policy: ResumePolicy,
    attempts: u32,
}

impl ResumeSchedule {
    pub fn new(policy: ResumePolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Schedule the next attempt, or `None` once the policy's limit is spent
    pub fn next_attempt(&mut self) -> Option<ResumeAttempt> {
        let number = self.attempts.saturating_add(1);
        if !self.policy.allows(number) {
            return None;
        }
        self.attempts = number;
        Some(ResumeAttempt {
            number,
            delay: self.policy.delay_for(number),
        })
    }

    /// The current session is delivering traffic. Returns true if a
    /// pending attempt count was cleared.
    pub fn mark_healthy(&mut self) -> bool {
        std::mem::take(&mut self.attempts) > 0
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
