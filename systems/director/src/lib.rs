#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Game-mode goal tracking for endless, time-attack, and levels play.
//!
//! The director watches the event stream and decides when a round is over
//! for reasons the round itself cannot see: an expired countdown or a met
//! delivery quota. It never touches round state directly; it only emits
//! [`Command::EndRound`].

use std::time::Duration;

use claw_arcade_core::{Command, EndReason, Event, GameMode, ModeProgress};

/// Pure system tracking mode-specific goal state across a round.
#[derive(Debug)]
pub struct Director {
    mode: GameMode,
    remaining: Duration,
    level: u32,
    delivered: u32,
    ending_sent: bool,
    halted: bool,
}

impl Director {
    /// Creates a director for the provided game mode.
    #[must_use]
    pub fn new(mode: GameMode) -> Self {
        let remaining = match mode {
            GameMode::TimeAttack { duration } => duration,
            GameMode::Endless | GameMode::Levels { .. } => Duration::ZERO,
        };
        Self {
            mode,
            remaining,
            level: 1,
            delivered: 0,
            ending_sent: false,
            halted: false,
        }
    }

    /// Deliveries required to finish the current level, if in levels mode.
    #[must_use]
    pub fn current_goal(&self) -> Option<u32> {
        match self.mode {
            GameMode::Levels {
                goal,
                per_level_increment,
                ..
            } => Some(goal.saturating_add(per_level_increment.saturating_mul(self.level - 1))),
            GameMode::Endless | GameMode::TimeAttack { .. } => None,
        }
    }

    /// Mode-specific progress for session snapshots.
    #[must_use]
    pub fn progress(&self) -> ModeProgress {
        match self.mode {
            GameMode::Endless => ModeProgress::Endless,
            GameMode::TimeAttack { .. } => ModeProgress::TimeAttack {
                remaining: self.remaining,
            },
            GameMode::Levels { .. } => ModeProgress::Levels {
                level: self.level,
                delivered: self.delivered,
                goal: self.current_goal().unwrap_or(0),
            },
        }
    }

    /// Consumes round events to emit terminal commands when a goal resolves.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Command>) {
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => {
                    if matches!(self.mode, GameMode::TimeAttack { .. }) {
                        self.remaining = self.remaining.saturating_sub(*dt);
                    }
                }
                Event::PieceDelivered { .. } => {
                    self.delivered = self.delivered.saturating_add(1);
                }
                Event::RoundEnded { .. } => self.halted = true,
                _ => {}
            }
        }

        if self.halted || self.ending_sent {
            return;
        }

        match self.mode {
            GameMode::TimeAttack { .. } => {
                if self.remaining.is_zero() {
                    self.ending_sent = true;
                    out.push(Command::EndRound {
                        reason: EndReason::TimeExpired,
                    });
                }
            }
            GameMode::Levels { .. } => {
                if let Some(goal) = self.current_goal() {
                    if self.delivered >= goal {
                        self.ending_sent = true;
                        out.push(Command::EndRound {
                            reason: EndReason::GoalReached,
                        });
                    }
                }
            }
            GameMode::Endless => {}
        }
    }

    /// Moves to the next level of the ladder after a completed goal.
    ///
    /// Returns `false` outside levels mode or once the ladder is exhausted,
    /// leaving the director unchanged.
    pub fn advance_level(&mut self) -> bool {
        let GameMode::Levels { max_level, .. } = self.mode else {
            return false;
        };
        if self.level >= max_level {
            return false;
        }
        self.level += 1;
        self.delivered = 0;
        self.ending_sent = false;
        self.halted = false;
        true
    }
}
