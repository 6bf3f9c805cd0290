use std::time::Duration;

use claw_arcade_core::{Command, EndReason, Event, GameMode, ModeProgress, PieceId};
use claw_arcade_system_director::Director;

fn time_advanced(millis: u64) -> Event {
    Event::TimeAdvanced {
        dt: Duration::from_millis(millis),
    }
}

fn delivered() -> Event {
    Event::PieceDelivered {
        piece: PieceId::new(9),
        score_delta: 10,
    }
}

fn levels_mode() -> GameMode {
    GameMode::Levels {
        goal: 2,
        per_level_increment: 2,
        max_level: 3,
    }
}

#[test]
fn endless_mode_never_ends_the_round() {
    let mut director = Director::new(GameMode::Endless);
    let mut commands = Vec::new();
    director.handle(&[time_advanced(600_000), delivered()], &mut commands);
    assert!(commands.is_empty());
    assert_eq!(director.progress(), ModeProgress::Endless);
}

#[test]
fn countdown_expires_exactly_once() {
    let mut director = Director::new(GameMode::TimeAttack {
        duration: Duration::from_secs(60),
    });
    let mut commands = Vec::new();

    director.handle(&[time_advanced(59_999)], &mut commands);
    assert!(commands.is_empty());
    assert_eq!(
        director.progress(),
        ModeProgress::TimeAttack {
            remaining: Duration::from_millis(1),
        }
    );

    director.handle(&[time_advanced(1)], &mut commands);
    assert_eq!(
        commands,
        vec![Command::EndRound {
            reason: EndReason::TimeExpired,
        }]
    );

    commands.clear();
    director.handle(&[time_advanced(1000)], &mut commands);
    assert!(commands.is_empty(), "expiry must only be requested once");
}

#[test]
fn level_goal_triggers_completion() {
    let mut director = Director::new(levels_mode());
    let mut commands = Vec::new();

    director.handle(&[delivered()], &mut commands);
    assert!(commands.is_empty());
    assert_eq!(
        director.progress(),
        ModeProgress::Levels {
            level: 1,
            delivered: 1,
            goal: 2,
        }
    );

    director.handle(&[delivered()], &mut commands);
    assert_eq!(
        commands,
        vec![Command::EndRound {
            reason: EndReason::GoalReached,
        }]
    );
}

#[test]
fn advancing_levels_grows_the_goal_until_the_ladder_ends() {
    let mut director = Director::new(levels_mode());
    assert_eq!(director.current_goal(), Some(2));

    assert!(director.advance_level());
    assert_eq!(director.current_goal(), Some(4));
    assert_eq!(
        director.progress(),
        ModeProgress::Levels {
            level: 2,
            delivered: 0,
            goal: 4,
        }
    );

    assert!(director.advance_level());
    assert_eq!(director.current_goal(), Some(6));
    assert!(!director.advance_level(), "ladder ends at the maximum level");
}

#[test]
fn advance_level_is_rejected_outside_levels_mode() {
    let mut director = Director::new(GameMode::Endless);
    assert!(!director.advance_level());
}

#[test]
fn round_ending_halts_goal_tracking() {
    let mut director = Director::new(GameMode::TimeAttack {
        duration: Duration::from_secs(1),
    });
    let mut commands = Vec::new();
    director.handle(
        &[
            Event::RoundEnded {
                reason: EndReason::DangerLine,
                final_score: 40,
            },
            time_advanced(5_000),
        ],
        &mut commands,
    );
    assert!(commands.is_empty(), "a finished round needs no further ending");
}
