#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic spawning system that paces new pieces onto the board.
//!
//! The system accumulates simulated time from the event stream and emits one
//! [`Command::SpawnPiece`] per elapsed interval, choosing shape and column
//! from its own seeded random stream. The interval shrinks in steps as the
//! delivered score grows and never falls below the configured floor.

use std::time::Duration;

use claw_arcade_core::{Command, Event, ShapeKey};

const RNG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const RNG_INCREMENT: u64 = 1;

/// Configuration parameters required to construct the spawning system.
#[derive(Clone, Debug)]
pub struct Config {
    /// Interval between spawns at the start of a round.
    pub initial_interval: Duration,
    /// Floor the interval never shrinks below.
    pub min_interval: Duration,
    /// Amount the interval shrinks per difficulty step.
    pub interval_step: Duration,
    /// Delivered points required to advance one difficulty step.
    pub points_per_step: u32,
    /// Shapes eligible for spawning.
    pub shapes: Vec<ShapeKey>,
    /// Seed for the shape/column random stream.
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(4000),
            min_interval: Duration::from_millis(2000),
            interval_step: Duration::from_millis(300),
            points_per_step: 100,
            shapes: ShapeKey::TETROMINOES.to_vec(),
            rng_seed: 0x4d59_5df4_d0f3_3173,
        }
    }
}

/// Pure system that deterministically emits spawn commands while a round runs.
#[derive(Debug)]
pub struct Spawning {
    config: Config,
    accumulator: Duration,
    delivered_points: u32,
    rng_state: u64,
    halted: bool,
}

impl Spawning {
    /// Creates a new spawning system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let rng_state = config.rng_seed;
        Self {
            config,
            accumulator: Duration::ZERO,
            delivered_points: 0,
            rng_state,
            halted: false,
        }
    }

    /// Effective interval for the current delivered score.
    ///
    /// Monotonically non-increasing in the delivered score, floored at the
    /// configured minimum.
    #[must_use]
    pub fn current_interval(&self) -> Duration {
        let steps = if self.config.points_per_step == 0 {
            0
        } else {
            self.delivered_points / self.config.points_per_step
        };
        let shrink = self.config.interval_step.saturating_mul(steps);
        self.config
            .initial_interval
            .saturating_sub(shrink)
            .max(self.config.min_interval)
    }

    /// Consumes round events to emit spawn commands for elapsed intervals.
    pub fn handle(&mut self, events: &[Event], columns: u32, out: &mut Vec<Command>) {
        let mut accumulated = Duration::ZERO;
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => {
                    accumulated = accumulated.saturating_add(*dt);
                }
                Event::PieceDelivered { score_delta, .. } => {
                    self.delivered_points = self.delivered_points.saturating_add(*score_delta);
                }
                Event::RoundEnded { .. } => self.halted = true,
                _ => {}
            }
        }

        if self.halted || self.config.shapes.is_empty() || columns == 0 {
            return;
        }

        if accumulated.is_zero() {
            return;
        }

        self.accumulator = self.accumulator.saturating_add(accumulated);
        let spawn_attempts = self.resolve_spawn_attempts();

        for _ in 0..spawn_attempts {
            let shape = self.select_shape();
            let column = self.select_column(shape, columns);
            out.push(Command::SpawnPiece { shape, column });
        }
    }

    fn resolve_spawn_attempts(&mut self) -> usize {
        let interval = self.current_interval();
        if interval.is_zero() {
            return 0;
        }

        let mut attempts = 0;
        while self.accumulator >= interval {
            self.accumulator -= interval;
            attempts += 1;
        }
        attempts
    }

    fn select_shape(&mut self) -> ShapeKey {
        let value = self.advance_rng();
        let index = (value % self.config.shapes.len() as u64) as usize;
        self.config.shapes[index]
    }

    fn select_column(&mut self, shape: ShapeKey, columns: u32) -> u32 {
        let span = columns.saturating_sub(shape.width()).saturating_add(1);
        if span == 0 {
            return 0;
        }
        let value = self.advance_rng();
        (value % u64::from(span)) as u32
    }

    fn advance_rng(&mut self) -> u64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(RNG_MULTIPLIER)
            .wrapping_add(RNG_INCREMENT);
        self.rng_state
    }
}
