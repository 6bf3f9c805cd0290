use std::time::Duration;

use claw_arcade_core::{Command, Event, PieceId, ShapeKey};
use claw_arcade_round::{self as round, query, Round, RoundConfig};
use claw_arcade_system_spawning::{Config, Spawning};

fn prize_config(seed: u64) -> Config {
    Config {
        initial_interval: Duration::from_millis(500),
        min_interval: Duration::from_millis(200),
        interval_step: Duration::from_millis(100),
        points_per_step: 10,
        shapes: vec![ShapeKey::Prize],
        rng_seed: seed,
    }
}

fn time_advanced(millis: u64) -> Event {
    Event::TimeAdvanced {
        dt: Duration::from_millis(millis),
    }
}

fn delivered(points: u32) -> Event {
    Event::PieceDelivered {
        piece: PieceId::new(0),
        score_delta: points,
    }
}

#[test]
fn emits_multiple_spawn_commands_for_large_dt() {
    let mut spawning = Spawning::new(prize_config(0x1234_5678));
    let mut commands = Vec::new();
    spawning.handle(&[time_advanced(2000)], 10, &mut commands);

    assert_eq!(commands.len(), 4, "expected one spawn per interval");
    for command in &commands {
        match command {
            Command::SpawnPiece { shape, column } => {
                assert_eq!(*shape, ShapeKey::Prize);
                assert!(*column < 10);
            }
            other => panic!("unexpected command emitted: {other:?}"),
        }
    }
}

#[test]
fn interval_never_increases_and_respects_the_floor() {
    let mut spawning = Spawning::new(prize_config(1));
    let mut previous = spawning.current_interval();
    assert_eq!(previous, Duration::from_millis(500));

    for _ in 0..20 {
        let mut commands = Vec::new();
        spawning.handle(&[delivered(10)], 10, &mut commands);
        let current = spawning.current_interval();
        assert!(current <= previous, "interval must never grow");
        assert!(current >= Duration::from_millis(200), "floor must hold");
        previous = current;
    }
    assert_eq!(previous, Duration::from_millis(200));
}

#[test]
fn spawning_halts_once_the_round_ends() {
    let mut spawning = Spawning::new(prize_config(2));
    let mut commands = Vec::new();
    spawning.handle(
        &[
            Event::RoundEnded {
                reason: claw_arcade_core::EndReason::TimeExpired,
                final_score: 0,
            },
            time_advanced(10_000),
        ],
        10,
        &mut commands,
    );
    assert!(commands.is_empty(), "ended rounds must not spawn");
}

#[test]
fn identical_seeds_replay_identical_commands() {
    let mut first = Spawning::new(prize_config(0xfeed));
    let mut second = Spawning::new(prize_config(0xfeed));
    let mut first_commands = Vec::new();
    let mut second_commands = Vec::new();

    for _ in 0..8 {
        first.handle(&[time_advanced(700)], 10, &mut first_commands);
        second.handle(&[time_advanced(700)], 10, &mut second_commands);
    }

    assert_eq!(first_commands, second_commands, "replay diverged");
    assert!(!first_commands.is_empty());
}

#[test]
fn columns_always_fit_the_shape_footprint() {
    let mut spawning = Spawning::new(Config {
        shapes: vec![ShapeKey::I],
        initial_interval: Duration::from_millis(100),
        min_interval: Duration::from_millis(100),
        ..Config::default()
    });
    let mut commands = Vec::new();
    spawning.handle(&[time_advanced(5000)], 6, &mut commands);

    assert!(!commands.is_empty());
    for command in &commands {
        if let Command::SpawnPiece { shape, column } = command {
            assert!(column + shape.width() <= 6, "footprint must fit the board");
        }
    }
}

#[test]
fn spawn_commands_place_pieces_on_a_live_round() {
    let mut round = Round::new(RoundConfig::default()).expect("valid config");
    let mut spawning = Spawning::new(prize_config(0xabcd));

    let mut commands = Vec::new();
    spawning.handle(&[time_advanced(1500)], 10, &mut commands);
    assert_eq!(commands.len(), 3);

    let mut events = Vec::new();
    for command in commands {
        round::apply(&mut round, command, &mut events);
    }

    let spawned = events
        .iter()
        .filter(|event| matches!(event, Event::PieceSpawned { .. }))
        .count();
    assert_eq!(spawned, 3);
    assert_eq!(query::piece_view(&round).iter().count(), 3);
}
