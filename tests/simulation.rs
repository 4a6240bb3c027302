//! End-to-end simulation scenarios driven against a stepped game
//!
//! These tests construct the simulation directly and advance it with
//! synthetic 16 ms steps, observing room broadcasts through a subscriber.

use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use goalline::game::kernel::{BALL_STOP_SPEED, PITCH_CENTER};
use goalline::game::r#match::MatchStatus;
use goalline::game::world::{GoalZone, RectCollider, StaticWorld, BLUE_SPAWNS, RED_SPAWNS};
use goalline::game::{GameConfig, IngressMsg, SoccerGame};
use goalline::store::StatsStore;
use goalline::ws::protocol::{
    ClientMsg, FacingDirection, InputFrame, PlayerStats, ServerMsg, SkillId, Team,
};
use goalline::ws::rooms::RoomHub;

fn test_world() -> StaticWorld {
    StaticWorld::from_parts(
        vec![
            RectCollider { x: 0.0, y: 560.0, width: 120.0, height: 80.0 },
            RectCollider { x: 0.0, y: 960.0, width: 120.0, height: 80.0 },
            RectCollider { x: 3400.0, y: 560.0, width: 120.0, height: 80.0 },
            RectCollider { x: 3400.0, y: 960.0, width: 120.0, height: 80.0 },
        ],
        vec![
            GoalZone {
                name: "red_goal".to_string(),
                team: Team::Red,
                x: 0.0,
                y: 640.0,
                width: 120.0,
                height: 320.0,
            },
            GoalZone {
                name: "blue_goal".to_string(),
                team: Team::Blue,
                x: 3400.0,
                y: 640.0,
                width: 120.0,
                height: 320.0,
            },
        ],
    )
}

fn new_game() -> (SoccerGame, broadcast::Receiver<ServerMsg>) {
    new_game_with_seed(42)
}

fn new_game_with_seed(seed: u64) -> (SoccerGame, broadcast::Receiver<ServerMsg>) {
    let cfg = GameConfig { rng_seed: seed, start_ms: 1_000_000, ..GameConfig::default() };
    let room = Arc::new(RoomHub::new());
    let rx = room.subscribe();
    let (game, _tx) = SoccerGame::new(
        cfg,
        Arc::new(test_world()),
        room,
        StatsStore::new(),
        Arc::new(AtomicBool::new(true)),
        Arc::new(AtomicUsize::new(0)),
    );
    (game, rx)
}

fn join(game: &mut SoccerGame, id: Uuid, x: f64, y: f64) {
    game.ingest(IngressMsg::Join {
        player: id,
        display_name: format!("Player_{}", &id.to_string()[..8]),
        x,
        y,
        stats: Some(PlayerStats::balanced()),
    });
}

fn command(game: &mut SoccerGame, player: Uuid, msg: ClientMsg) {
    game.ingest(IngressMsg::Command { player, msg });
}

fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(msg) => out.push(msg),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

/// Drive a two-player game from lobby into active play
fn start_two_player_match(
    game: &mut SoccerGame,
    rx: &mut broadcast::Receiver<ServerMsg>,
) -> (Uuid, Uuid) {
    let red = Uuid::from_u128(1);
    let blue = Uuid::from_u128(2);
    join(game, red, 1000.0, 800.0);
    join(game, blue, 2500.0, 800.0);

    command(game, red, ClientMsg::AssignTeam { team: Some(Team::Red) });
    command(game, blue, ClientMsg::AssignTeam { team: Some(Team::Blue) });
    command(game, red, ClientMsg::StartGame);
    // Selection order is red then blue; both pick in the same step
    command(game, red, ClientMsg::PickSkill { skill_id: SkillId::Blink });
    command(game, blue, ClientMsg::PickSkill { skill_id: SkillId::Metavision });
    game.step();

    assert_eq!(game.match_state().status, MatchStatus::Active);
    let events = drain(rx);
    assert!(events.iter().any(|m| matches!(m, ServerMsg::GameStarted)));
    (red, blue)
}

#[test]
fn ball_rolls_to_a_stop_inside_drag_bound() {
    let (mut game, _rx) = new_game();

    {
        let ball = &mut game.sim_mut().ball;
        ball.x = PITCH_CENTER.0;
        ball.y = PITCH_CENTER.1;
        ball.vx = 600.0;
        ball.vy = 0.0;
        ball.moving = true;
    }

    // Five seconds of simulation
    game.step_n(313);

    let ball = &game.sim().ball;
    assert!(!ball.moving);
    assert!(ball.speed() < BALL_STOP_SPEED);
    // Exponential drag bounds total travel by v0 / drag
    assert!(ball.x < PITCH_CENTER.0 + 600.0);
    assert!(ball.x > PITCH_CENTER.0 + 500.0);
}

#[test]
fn accepted_kick_bumps_sequence_and_cooldown_rejects_the_next() {
    let (mut game, mut rx) = new_game();
    let kicker = Uuid::from_u128(7);
    join(&mut game, kicker, 1000.0, 800.0);
    game.sim_mut().players.get_mut(&kicker).unwrap().team = Team::Red;
    game.sim_mut().ball.x = 1100.0;
    game.sim_mut().ball.y = 800.0;

    command(
        &mut game,
        kicker,
        ClientMsg::BallKick { angle: 0.0, kick_power: 1000.0, timestamp: None, local_kick_id: Some(42) },
    );
    game.step();

    let events = drain(&mut rx);
    let kicked = events
        .iter()
        .find_map(|m| match m {
            ServerMsg::BallKicked { kicker: k, kick_sequence, local_kick_id } => {
                Some((*k, *kick_sequence, *local_kick_id))
            }
            _ => None,
        })
        .expect("kick event");
    assert_eq!(kicked, (kicker, 1, Some(42)));
    // 5 kick power stat -> x1.5
    assert!(game.sim().ball.vx > 1400.0 && game.sim().ball.vx <= 1500.0);
    // An immediate ball snapshot accompanies the kick
    assert!(events.iter().any(|m| matches!(m, ServerMsg::BallState { .. })));

    // A second kick 200 ms later is silently dropped
    game.step_n(12);
    command(
        &mut game,
        kicker,
        ClientMsg::BallKick { angle: 0.0, kick_power: 1000.0, timestamp: None, local_kick_id: Some(43) },
    );
    game.step();

    assert_eq!(game.sim().ball.kick_sequence, 1);
    let events = drain(&mut rx);
    assert!(!events.iter().any(|m| matches!(m, ServerMsg::BallKicked { .. })));
}

#[test]
fn goal_scores_for_the_opposite_team_and_resets_after_three_seconds() {
    let (mut game, mut rx) = new_game();
    let (red, blue) = start_two_player_match(&mut game, &mut rx);

    let sequence_before = game.sim().ball.kick_sequence;
    // Push the ball into the red goal zone
    game.sim_mut().ball.x = 60.0;
    game.sim_mut().ball.y = 800.0;
    game.step();

    let events = drain(&mut rx);
    let scored = events
        .iter()
        .find_map(|m| match m {
            ServerMsg::GoalScored { scoring_team, score_red, score_blue, .. } => {
                Some((*scoring_team, *score_red, *score_blue))
            }
            _ => None,
        })
        .expect("goal event within one step");
    assert_eq!(scored, (Team::Blue, 0, 1));

    // Ball holds still during the pending reset
    game.step_n(100);
    assert_eq!(game.sim().ball.speed(), 0.0);

    // Three seconds after the goal everything is back at spawn
    game.step_n(100);
    let ball = &game.sim().ball;
    assert_eq!((ball.x, ball.y), PITCH_CENTER);
    assert_eq!(ball.speed(), 0.0);
    assert_eq!(ball.kick_sequence, sequence_before + 1);

    let players = &game.sim().players;
    assert_eq!((players[&red].x, players[&red].y), RED_SPAWNS[0]);
    assert_eq!((players[&blue].x, players[&blue].y), BLUE_SPAWNS[0]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|m| matches!(m, ServerMsg::PlayerReset { .. })));
}

#[test]
fn lag_compensated_kick_accepts_a_rewound_position() {
    let (mut game, mut rx) = new_game();
    let kicker = Uuid::from_u128(9);
    join(&mut game, kicker, 940.0, 800.0);
    game.sim_mut().players.get_mut(&kicker).unwrap().team = Team::Red;
    game.sim_mut().ball.x = 980.0;
    game.sim_mut().ball.y = 800.0;

    // Build up ~1 s of history at the old position
    game.step_n(40);
    let rewind_to = game.sim().now_ms - 120;

    // The kicker has since been displaced far out of range
    game.sim_mut().players.get_mut(&kicker).unwrap().place_at(600.0, 800.0);

    command(
        &mut game,
        kicker,
        ClientMsg::BallKick {
            angle: 0.0,
            kick_power: 1000.0,
            timestamp: Some(rewind_to),
            local_kick_id: None,
        },
    );
    game.step();

    assert_eq!(game.sim().ball.kick_sequence, 1);
    let events = drain(&mut rx);
    assert!(events.iter().any(|m| matches!(m, ServerMsg::BallKicked { .. })));
}

#[test]
fn blink_teleports_four_hundred_pixels_and_goes_on_cooldown() {
    let (mut game, mut rx) = new_game();
    let player = Uuid::from_u128(11);
    join(&mut game, player, 500.0, 500.0);
    {
        let body = game.sim_mut().players.get_mut(&player).unwrap();
        body.team = Team::Red;
        body.place_at(1000.0, 800.0);
    }

    command(
        &mut game,
        player,
        ClientMsg::ActivateSkill { skill_id: SkillId::Blink, facing: Some(FacingDirection::Right) },
    );
    game.step();

    let body = &game.sim().players[&player];
    assert_eq!((body.x, body.y), (1400.0, 800.0));
    assert_eq!((body.vx, body.vy), (0.0, 0.0));

    let events = drain(&mut rx);
    let blink = events
        .iter()
        .find_map(|m| match m {
            ServerMsg::BlinkActivated { from_x, from_y, to_x, to_y, .. } => {
                Some((*from_x, *from_y, *to_x, *to_y))
            }
            _ => None,
        })
        .expect("blink event");
    assert_eq!(blink, (1000.0, 800.0, 1400.0, 800.0));

    // Cooldown blocks the next use
    command(
        &mut game,
        player,
        ClientMsg::ActivateSkill { skill_id: SkillId::Blink, facing: Some(FacingDirection::Right) },
    );
    game.step();
    assert_eq!(game.sim().players[&player].x, 1400.0);
}

#[test]
fn silent_picker_is_auto_picked_after_thirty_seconds() {
    let (mut game, mut rx) = new_game();
    let players: Vec<Uuid> = (20..24).map(Uuid::from_u128).collect();
    for (i, &p) in players.iter().enumerate() {
        join(&mut game, p, 500.0 + i as f64 * 100.0, 500.0);
        let team = if i % 2 == 0 { Team::Red } else { Team::Blue };
        game.sim_mut().players.get_mut(&p).unwrap().team = team;
    }

    command(&mut game, players[0], ClientMsg::StartGame);
    game.step();
    assert_eq!(game.match_state().status, MatchStatus::SkillSelection);
    let first_picker = game
        .match_state()
        .selection
        .as_ref()
        .unwrap()
        .current_picker()
        .unwrap();
    drain(&mut rx);

    // 30 seconds of silence fires exactly one auto-pick
    game.step_n(1876);
    let events = drain(&mut rx);
    let auto_picks: Vec<_> = events
        .iter()
        .filter_map(|m| match m {
            ServerMsg::SkillPicked { player, auto: true, .. } => Some(*player),
            _ => None,
        })
        .collect();
    assert_eq!(auto_picks, vec![first_picker]);
    assert!(events
        .iter()
        .any(|m| matches!(m, ServerMsg::SelectionUpdate { .. })));

    // The remaining pickers choose promptly and the match starts
    while game.match_state().status == MatchStatus::SkillSelection {
        let (picker, skill) = {
            let selection = game.match_state().selection.as_ref().unwrap();
            (selection.current_picker().unwrap(), selection.available[0])
        };
        command(&mut game, picker, ClientMsg::PickSkill { skill_id: skill });
        game.step();
    }
    assert_eq!(game.match_state().status, MatchStatus::Active);
    let events = drain(&mut rx);
    assert!(events.iter().any(|m| matches!(m, ServerMsg::GameStarted)));
}

#[test]
fn identical_input_scripts_produce_bit_identical_state() {
    let run = || {
        let (mut game, _rx) = new_game_with_seed(7);
        let a = Uuid::from_u128(100);
        let b = Uuid::from_u128(200);
        join(&mut game, a, 1000.0, 700.0);
        join(&mut game, b, 1200.0, 900.0);
        for body in game.sim_mut().players.values_mut() {
            body.team = Team::Red;
        }

        for round in 0..10u32 {
            let frames: Vec<InputFrame> = (0..20)
                .map(|i| InputFrame {
                    up: i % 3 == 0,
                    down: false,
                    left: i % 2 == 0,
                    right: i % 2 == 1,
                    sequence: round * 20 + i + 1,
                })
                .collect();
            command(&mut game, a, ClientMsg::PlayerInputBatch { inputs: frames.clone() });
            command(&mut game, b, ClientMsg::PlayerInputBatch { inputs: frames });
            game.step_n(20);
        }

        let pa = &game.sim().players[&a];
        let pb = &game.sim().players[&b];
        [
            pa.x.to_bits(),
            pa.y.to_bits(),
            pa.vx.to_bits(),
            pa.vy.to_bits(),
            pb.x.to_bits(),
            pb.y.to_bits(),
            game.sim().ball.x.to_bits(),
            game.sim().ball.y.to_bits(),
        ]
    };

    assert_eq!(run(), run());
}

#[test]
fn acknowledged_sequences_never_decrease() {
    let (mut game, _rx) = new_game();
    let p = Uuid::from_u128(300);
    join(&mut game, p, 1000.0, 800.0);
    game.sim_mut().players.get_mut(&p).unwrap().team = Team::Red;

    let frames: Vec<InputFrame> = (1..=50)
        .map(|sequence| InputFrame { up: false, down: false, left: false, right: true, sequence })
        .collect();
    command(&mut game, p, ClientMsg::PlayerInputBatch { inputs: frames });

    let mut last_seq = 0;
    let mut last_tick = 0;
    for _ in 0..60 {
        game.step();
        let seq = game.sim().players[&p].last_processed_seq;
        let tick = game.sim().tick;
        assert!(seq >= last_seq);
        assert!(tick > last_tick);
        last_seq = seq;
        last_tick = tick;
    }
    // All fifty inputs were eventually consumed, one per step
    assert_eq!(last_seq, 50);
}

#[test]
fn tie_goes_to_overtime_and_late_goal_decides_the_match() {
    let (mut game, mut rx) = new_game();
    let (_red, blue) = start_two_player_match(&mut game, &mut rx);

    // Play out regulation scoreless: 300 s at 16 ms per step
    game.step_n(18_750);
    let events = drain(&mut rx);
    assert!(events.iter().any(|m| matches!(m, ServerMsg::Overtime { seconds: 60 })));
    assert_eq!(game.match_state().status, MatchStatus::Active);
    assert!(game.match_state().overtime);

    // Blue scores in overtime
    let now_ms = game.sim().now_ms;
    game.sim_mut().ball.register_touch(blue, now_ms);
    game.sim_mut().ball.x = 60.0;
    game.sim_mut().ball.y = 800.0;
    game.step();

    // Run out the overtime clock
    game.step_n(3_750);
    let events = drain(&mut rx);
    let end = events
        .iter()
        .find_map(|m| match m {
            ServerMsg::GameEnd { winner, score_red, score_blue, mvp, mmr_updates } => {
                Some((*winner, *score_red, *score_blue, *mvp, mmr_updates.len()))
            }
            _ => None,
        })
        .expect("game end event");
    assert_eq!(end.0, Some(Team::Blue));
    assert_eq!((end.1, end.2), (0, 1));
    assert_eq!(end.3, Some(blue));
    assert_eq!(end.4, 2);

    // Back in the lobby with cleared score
    assert_eq!(game.match_state().status, MatchStatus::Lobby);
    assert_eq!(game.match_state().score_blue, 0);
}

#[tokio::test]
async fn loop_runs_only_while_players_are_present() {
    let cfg = GameConfig::default();
    let room = Arc::new(RoomHub::new());
    let world = Arc::new(test_world());
    let service = Arc::new(goalline::game::GameService::new(
        cfg,
        world,
        StatsStore::new(),
        room,
    ));

    assert!(!service.is_running());

    // A disconnect from a client that never entered the scene is dropped
    // rather than starting an empty loop
    let player = Uuid::from_u128(500);
    service.send(IngressMsg::Leave { player }).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!service.is_running());

    service
        .send(IngressMsg::Join {
            player,
            display_name: "p".to_string(),
            x: 1000.0,
            y: 800.0,
            stats: None,
        })
        .await;
    assert!(service.is_running());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(service.is_running());
    assert_eq!(service.player_count(), 1);

    service.send(IngressMsg::Leave { player }).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!service.is_running());
    assert_eq!(service.player_count(), 0);
}
