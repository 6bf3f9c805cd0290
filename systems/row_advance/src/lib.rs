#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fixed-cadence row scrolling for the variant where the stack creeps upward.

use std::time::Duration;

use claw_arcade_core::{Command, Event};

/// Configuration parameters required to construct the row-advance system.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Time between successive row shifts.
    pub cadence: Duration,
}

impl Config {
    /// Creates a new configuration using the provided shift cadence.
    #[must_use]
    pub const fn new(cadence: Duration) -> Self {
        Self { cadence }
    }
}

/// Pure system that emits one row shift per elapsed cadence interval.
#[derive(Debug)]
pub struct RowAdvance {
    cadence: Duration,
    accumulator: Duration,
    halted: bool,
}

impl RowAdvance {
    /// Creates a new row-advance system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            cadence: config.cadence,
            accumulator: Duration::ZERO,
            halted: false,
        }
    }

    /// Consumes round events to emit shift commands for elapsed intervals.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Command>) {
        let mut accumulated = Duration::ZERO;
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => {
                    accumulated = accumulated.saturating_add(*dt);
                }
                Event::RoundEnded { .. } => self.halted = true,
                _ => {}
            }
        }

        if self.halted || self.cadence.is_zero() || accumulated.is_zero() {
            return;
        }

        self.accumulator = self.accumulator.saturating_add(accumulated);
        while self.accumulator >= self.cadence {
            self.accumulator -= self.cadence;
            out.push(Command::AdvanceRows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_arcade_core::EndReason;

    fn time_advanced(millis: u64) -> Event {
        Event::TimeAdvanced {
            dt: Duration::from_millis(millis),
        }
    }

    #[test]
    fn emits_one_shift_per_elapsed_cadence() {
        let mut system = RowAdvance::new(Config::new(Duration::from_secs(4)));
        let mut commands = Vec::new();

        system.handle(&[time_advanced(3999)], &mut commands);
        assert!(commands.is_empty());

        system.handle(&[time_advanced(8001)], &mut commands);
        assert_eq!(commands, vec![Command::AdvanceRows; 3]);
    }

    #[test]
    fn zero_cadence_never_emits() {
        let mut system = RowAdvance::new(Config::new(Duration::ZERO));
        let mut commands = Vec::new();
        system.handle(&[time_advanced(60_000)], &mut commands);
        assert!(commands.is_empty());
    }

    #[test]
    fn halts_once_the_round_ends() {
        let mut system = RowAdvance::new(Config::new(Duration::from_secs(1)));
        let mut commands = Vec::new();
        system.handle(
            &[
                Event::RoundEnded {
                    reason: EndReason::DangerLine,
                    final_score: 30,
                },
                time_advanced(10_000),
            ],
            &mut commands,
        );
        assert!(commands.is_empty());
    }
}
