#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless command-line adapter that autoplays a Claw Arcade session.
//!
//! The adapter stands in for the real presentation layer: it feeds scripted
//! random input into the session facade, prints the event stream as it
//! arrives, and reports the final outcome. Useful for smoke-testing the
//! simulation without a renderer attached.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use claw_arcade_core::{ClawState, Event, GameMode, HorizontalIntent, SessionStatus};
use claw_arcade_round::RoundConfig;
use claw_arcade_session::{Session, SessionConfig};
use claw_arcade_system_row_advance as row_advance;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Command-line arguments accepted by the autoplay harness.
#[derive(Debug, Parser)]
#[command(name = "claw-arcade", about = "Headless Claw Arcade autoplay harness")]
struct Args {
    /// Seed for both the simulation and the scripted player.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Game mode to play.
    #[arg(long, value_enum, default_value_t = ModeArg::Endless)]
    mode: ModeArg,

    /// Number of frames to simulate before giving up.
    #[arg(long, default_value_t = 2400)]
    ticks: u32,

    /// Simulated milliseconds per frame.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Probability that a qualified candidate is grabbed.
    #[arg(long, default_value_t = 0.7)]
    grab_success: f64,

    /// Enable the upward row scroll with the given cadence in milliseconds.
    #[arg(long)]
    scroll_ms: Option<u64>,

    /// Only print the final summary, not the event stream.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

/// Game modes selectable from the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// Play until the danger line ends the round.
    Endless,
    /// Sixty seconds on the clock.
    TimeAttack,
    /// Climb the level ladder.
    Levels,
}

impl ModeArg {
    fn to_mode(self) -> GameMode {
        match self {
            Self::Endless => GameMode::Endless,
            Self::TimeAttack => GameMode::TimeAttack {
                duration: Duration::from_secs(60),
            },
            Self::Levels => GameMode::Levels {
                goal: 5,
                per_level_increment: 2,
                max_level: 10,
            },
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = SessionConfig {
        round: RoundConfig {
            grab_success: args.grab_success,
            ..RoundConfig::default()
        },
        row_advance: args
            .scroll_ms
            .map(|ms| row_advance::Config::new(Duration::from_millis(ms))),
        mode: args.mode.to_mode(),
        global_seed: args.seed,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config).context("invalid session configuration")?;
    let mut player = ChaCha8Rng::seed_from_u64(args.seed);
    let dt = Duration::from_millis(args.tick_ms);

    let columns = session.snapshot().board.columns;
    for frame in 0..args.ticks {
        if session.snapshot().claw.state == ClawState::Idle {
            if player.gen_bool(0.05) {
                session.trigger_grab();
            } else if player.gen_bool(0.1) {
                let target = player.gen_range(0.5..=columns as f32 - 0.5);
                session.set_horizontal_intent(HorizontalIntent::Target(target));
            }
        }

        let events = session.tick(dt);
        if !args.quiet {
            for event in &events {
                if let Some(line) = describe(event) {
                    println!("[{frame:>5}] {line}");
                }
            }
        }

        let status = session.snapshot().status;
        match status {
            SessionStatus::Running => {}
            SessionStatus::LevelComplete => {
                if !session.advance_level() {
                    break;
                }
                println!("--- level complete, advancing ---");
            }
            SessionStatus::GameOver => break,
        }
    }

    let snapshot = session.snapshot();
    println!(
        "final: status {:?}, score {}, pieces left {}",
        snapshot.status,
        snapshot.score,
        snapshot.pieces.iter().count()
    );
    Ok(())
}

fn describe(event: &Event) -> Option<String> {
    match event {
        Event::TimeAdvanced { .. } => None,
        Event::PieceSpawned {
            piece,
            shape,
            anchor,
        } => Some(format!(
            "spawned piece {} ({shape:?}) at column {}, row {}",
            piece.get(),
            anchor.column(),
            anchor.row()
        )),
        Event::PieceGrabbed { piece } => Some(format!("grabbed piece {}", piece.get())),
        Event::PieceMissed => Some("grab missed".to_owned()),
        Event::PieceDropped { piece } => Some(format!("dropped piece {}", piece.get())),
        Event::PieceSettled { piece, anchor } => Some(format!(
            "piece {} settled at column {}, row {}",
            piece.get(),
            anchor.column(),
            anchor.row()
        )),
        Event::PieceEvicted { piece } => Some(format!("piece {} pushed out", piece.get())),
        Event::RowsAdvanced => Some("rows advanced".to_owned()),
        Event::PieceDelivered { piece, score_delta } => Some(format!(
            "delivered piece {} for {score_delta} points",
            piece.get()
        )),
        Event::ClawStateChanged { from, to } => Some(format!("claw {from:?} -> {to:?}")),
        Event::RoundEnded {
            reason,
            final_score,
        } => Some(format!("round ended ({reason:?}) with score {final_score}")),
    }
}
