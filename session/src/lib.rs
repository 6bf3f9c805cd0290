#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Session facade tying the round to its systems.
//!
//! A [`Session`] is what the presentation layer drives: it owns the
//! authoritative [`Round`] plus the spawning, row-advance, and director
//! systems, and pumps the command/event loop to quiescence inside every
//! call. Input arrives through explicit command methods, observation leaves
//! through the returned event logs and [`SessionSnapshot`] values; the
//! session never calls back into its caller.

use std::time::Duration;

use claw_arcade_core::{
    BoardSnapshot, ClawSnapshot, Command, Event, GameMode, HorizontalIntent, ModeProgress,
    PieceView, SessionStatus, RNG_STREAM_ROUND, RNG_STREAM_SPAWN,
};
use claw_arcade_round::{self as round, query, ConfigError, Round, RoundConfig};
use claw_arcade_system_director::Director;
use claw_arcade_system_row_advance::{self as row_advance, RowAdvance};
use claw_arcade_system_spawning::{self as spawning, Spawning};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DEFAULT_GLOBAL_SEED: u64 = 0x2b99_4a5c_17d6_03e1;

/// Complete configuration for one session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Round tuning; its `rng_seed` is overridden by the derived stream.
    pub round: RoundConfig,
    /// Spawn pacing; its `rng_seed` is overridden by the derived stream.
    pub spawning: spawning::Config,
    /// Row scroll cadence, or `None` for the stacking-only variant.
    pub row_advance: Option<row_advance::Config>,
    /// Goal structure of the session.
    pub mode: GameMode,
    /// Seed from which every random stream is derived.
    pub global_seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            round: RoundConfig::default(),
            spawning: spawning::Config::default(),
            row_advance: None,
            mode: GameMode::Endless,
            global_seed: DEFAULT_GLOBAL_SEED,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), SessionConfigError> {
        self.round.validate()?;
        if self.spawning.initial_interval.is_zero() {
            return Err(SessionConfigError::ZeroSpawnInterval);
        }
        if self.spawning.min_interval > self.spawning.initial_interval {
            return Err(SessionConfigError::SpawnFloorAboveInitial {
                min: self.spawning.min_interval,
                initial: self.spawning.initial_interval,
            });
        }
        if let Some(config) = &self.row_advance {
            if config.cadence.is_zero() {
                return Err(SessionConfigError::ZeroRowAdvanceCadence);
            }
        }
        if let GameMode::Levels {
            goal, max_level, ..
        } = self.mode
        {
            if goal == 0 || max_level == 0 {
                return Err(SessionConfigError::InvalidLevelLadder);
            }
        }
        Ok(())
    }
}

/// Reasons a [`SessionConfig`] is rejected before any tick runs.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SessionConfigError {
    /// The round configuration failed its own validation.
    #[error(transparent)]
    Round(#[from] ConfigError),
    /// The spawn interval must be positive.
    #[error("initial spawn interval must be positive")]
    ZeroSpawnInterval,
    /// The spawn floor may not exceed the initial interval.
    #[error("minimum spawn interval {min:?} exceeds the initial interval {initial:?}")]
    SpawnFloorAboveInitial {
        /// Configured floor.
        min: Duration,
        /// Configured initial interval.
        initial: Duration,
    },
    /// The row scroll cadence must be positive when enabled.
    #[error("row advance cadence must be positive")]
    ZeroRowAdvanceCadence,
    /// Levels mode needs a positive goal and at least one level.
    #[error("levels mode requires a positive goal and level count")]
    InvalidLevelLadder,
}

/// Read-only view of everything the presentation layer renders.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    /// Claw state, position, and carried piece.
    pub claw: ClawSnapshot,
    /// Active pieces sorted by id.
    pub pieces: PieceView,
    /// Owned copy of the board occupancy.
    pub board: BoardSnapshot,
    /// Total score, including completed levels.
    pub score: u32,
    /// Status of the current round.
    pub status: SessionStatus,
    /// Mode-specific goal progress.
    pub progress: ModeProgress,
}

/// One playthrough: the round, its systems, and cross-level bookkeeping.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    round: Round,
    spawning: Spawning,
    row_advance: Option<RowAdvance>,
    director: Director,
    round_index: u32,
    score_carry: u32,
    pending: Vec<Event>,
}

impl Session {
    /// Creates a new session, rejecting invalid configuration up front.
    pub fn new(config: SessionConfig) -> Result<Self, SessionConfigError> {
        config.validate()?;
        let round_index = 0;
        let round = build_round(&config, round_index)?;
        let spawning = build_spawning(&config, round_index);
        let row_advance = config.row_advance.map(RowAdvance::new);
        let director = Director::new(config.mode);
        Ok(Self {
            config,
            round,
            spawning,
            row_advance,
            director,
            round_index,
            score_carry: 0,
            pending: Vec::new(),
        })
    }

    /// Advances the simulation by one frame.
    ///
    /// Returns the chronological event log of the frame, including events
    /// buffered by command methods since the previous tick.
    pub fn tick(&mut self, dt: Duration) -> Vec<Event> {
        let mut log = std::mem::take(&mut self.pending);
        let mut events = Vec::new();
        round::apply(&mut self.round, Command::Tick { dt }, &mut events);
        log.extend(events.iter().cloned());
        self.pump(events, &mut log);
        log
    }

    /// Updates the claw's horizontal intent; a no-op outside `Idle`.
    pub fn set_horizontal_intent(&mut self, intent: HorizontalIntent) {
        self.buffer_command(Command::SetHorizontalIntent { intent });
    }

    /// Requests a drop-and-grab cycle; a no-op outside `Idle`.
    pub fn trigger_grab(&mut self) {
        self.buffer_command(Command::TriggerGrab);
    }

    /// Captures a read-only snapshot of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            claw: query::claw(&self.round),
            pieces: query::piece_view(&self.round),
            board: query::board_snapshot(&self.round),
            score: self.score_carry.saturating_add(query::score(&self.round)),
            status: query::status(&self.round),
            progress: self.director.progress(),
        }
    }

    /// Discards the current round and starts a fresh one from scratch.
    ///
    /// Valid at any point; score and level progress reset, and the random
    /// streams are re-derived so the new round plays out differently.
    pub fn restart(&mut self) {
        self.round_index = self.round_index.wrapping_add(1);
        self.score_carry = 0;
        self.pending.clear();
        self.round = build_round(&self.config, self.round_index)
            .unwrap_or_else(|_| unreachable!("validated configuration"));
        self.spawning = build_spawning(&self.config, self.round_index);
        self.row_advance = self.config.row_advance.map(RowAdvance::new);
        self.director = Director::new(self.config.mode);
    }

    /// Starts the next level after a completed goal, carrying the score.
    ///
    /// Returns `false` unless the round is in `LevelComplete` and the level
    /// ladder has a next rung.
    pub fn advance_level(&mut self) -> bool {
        if query::status(&self.round) != SessionStatus::LevelComplete {
            return false;
        }
        if !self.director.advance_level() {
            return false;
        }
        self.score_carry = self
            .score_carry
            .saturating_add(query::score(&self.round));
        self.round_index = self.round_index.wrapping_add(1);
        self.pending.clear();
        self.round = build_round(&self.config, self.round_index)
            .unwrap_or_else(|_| unreachable!("validated configuration"));
        self.spawning = build_spawning(&self.config, self.round_index);
        self.row_advance = self.config.row_advance.map(RowAdvance::new);
        true
    }

    fn buffer_command(&mut self, command: Command) {
        let mut events = Vec::new();
        round::apply(&mut self.round, command, &mut events);
        self.pending.extend(events);
    }

    /// Feeds events to the systems and applies the commands they emit until
    /// the loop reaches quiescence.
    fn pump(&mut self, mut events: Vec<Event>, log: &mut Vec<Event>) {
        loop {
            if events.is_empty() {
                break;
            }

            let (columns, _) = query::dimensions(&self.round);
            let mut commands = Vec::new();
            self.spawning.handle(&events, columns, &mut commands);
            if let Some(row_advance) = &mut self.row_advance {
                row_advance.handle(&events, &mut commands);
            }
            self.director.handle(&events, &mut commands);

            if commands.is_empty() {
                break;
            }

            events.clear();
            for command in commands {
                let mut generated = Vec::new();
                round::apply(&mut self.round, command, &mut generated);
                log.extend(generated.iter().cloned());
                events.extend(generated);
            }
        }
    }
}

fn build_round(config: &SessionConfig, round_index: u32) -> Result<Round, ConfigError> {
    let base = derive_base_seed(config.global_seed, round_index);
    let round_config = RoundConfig {
        rng_seed: derive_labeled_seed(base, RNG_STREAM_ROUND),
        ..config.round
    };
    Round::new(round_config)
}

fn build_spawning(config: &SessionConfig, round_index: u32) -> Spawning {
    let base = derive_base_seed(config.global_seed, round_index);
    let spawning_config = spawning::Config {
        rng_seed: derive_labeled_seed(base, RNG_STREAM_SPAWN),
        ..config.spawning.clone()
    };
    Spawning::new(spawning_config)
}

fn derive_base_seed(global_seed: u64, round_index: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(round_index.to_le_bytes());
    finalize_seed(hasher)
}

fn derive_labeled_seed(base: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(base.to_le_bytes());
    hasher.update(label.as_bytes());
    finalize_seed(hasher)
}

fn finalize_seed(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest[0..8].try_into().expect("sha256 digest slice length");
    u64::from_le_bytes(bytes)
}
