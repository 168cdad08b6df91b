mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use actix::{Actor, Addr, Context, Handler};
use chrono::Utc;
use common::{fast_settings, start_session, wait_for_idle, MockCoordinator};
use gc_server::{
    env::MatchTrackingSettings,
    error::MatchError,
    match_tracker::{
        lobby::{LobbyMember, LobbySnapshot, LobbyState},
        match_info::{ConnectionState, MatchInfo},
        messages::*,
        spawn_match_tracker,
        vote_kick::VoteKickDecision,
        MatchTracker,
    },
    protocol::{DropReason, GcMessageType, MatchGroup, Team, TeamAssignment},
    session::GcSession,
};
use serde_json::json;

fn tracking_settings() -> MatchTrackingSettings {
    MatchTrackingSettings {
        abandon_threshold_seconds: 30,
        new_match_delay_seconds: 1,
        // Think 는 테스트에서 직접 보낸다
        think_interval_ms: 3_600_000,
        stats_resend_interval_seconds: 3_600,
        ..Default::default()
    }
}

fn member(steam_id: u64, team: Team) -> LobbyMember {
    LobbyMember {
        steam_id,
        party_id: None,
        team,
        skill_rating: 0.0,
    }
}

fn lobby(match_group: MatchGroup, members: Vec<LobbyMember>) -> LobbySnapshot {
    LobbySnapshot {
        lobby_id: 42,
        match_id: Some(500),
        state: LobbyState::RunGame,
        match_group,
        map: "ctf_2fort".to_string(),
        members,
    }
}

struct Harness {
    mock: Arc<MockCoordinator>,
    session: GcSession,
    tracker: Addr<MatchTracker>,
}

impl Harness {
    async fn start(match_group: MatchGroup) -> Self {
        let mock = MockCoordinator::new();
        let session = start_session(&mock, &fast_settings());
        let tracker = spawn_match_tracker(session.clone(), tracking_settings());

        tracker
            .send(LobbyUpdated(lobby(
                match_group,
                vec![member(1, Team::Red), member(2, Team::Blue), member(3, Team::Red)],
            )))
            .await
            .unwrap();
        for steam_id in [1, 2, 3] {
            tracker
                .send(ClientConnected {
                    steam_id,
                    ent_index: Some(steam_id as u32),
                })
                .await
                .unwrap()
                .unwrap();
            tracker.send(ClientActive { steam_id }).await.unwrap().unwrap();
        }

        Self {
            mock,
            session,
            tracker,
        }
    }

    async fn snapshot(&self) -> MatchInfo {
        self.tracker
            .send(GetMatchSnapshot)
            .await
            .unwrap()
            .expect("match should be tracked")
    }
}

#[derive(Default)]
struct DecisionCollector {
    seen: Arc<Mutex<Vec<VoteKickDecided>>>,
}

impl Actor for DecisionCollector {
    type Context = Context<Self>;
}

impl Handler<VoteKickDecided> for DecisionCollector {
    type Result = ();

    fn handle(&mut self, msg: VoteKickDecided, _ctx: &mut Context<Self>) -> Self::Result {
        self.seen.lock().unwrap().push(msg);
    }
}

#[actix_web::test]
async fn test_lobby_updates_reconcile_membership() {
    let h = Harness::start(MatchGroup::Casual12v12).await;

    let info = h.snapshot().await;
    assert_eq!(info.match_id, Some(500));
    assert_eq!(info.num_active_players(), 3);
    assert_eq!(h.session.identity.current(), Some(500));

    h.tracker
        .send(LobbyUpdated(lobby(
            MatchGroup::Casual12v12,
            vec![member(1, Team::Red), member(3, Team::Red), member(4, Team::Blue)],
        )))
        .await
        .unwrap();

    let info = h.snapshot().await;
    assert_eq!(
        info.player(2).unwrap().state,
        ConnectionState::Dropped(DropReason::Left)
    );
    let newcomer = info.player(4).unwrap();
    assert!(newcomer.late_join);
    assert_eq!(newcomer.state, ConnectionState::Disconnected);
    assert_eq!(info.num_live_players(), 3);
}

#[actix_web::test]
async fn test_second_new_match_request_is_rejected_while_pending() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    h.tracker
        .send(DropPlayer {
            steam_id: 3,
            reason: DropReason::Left,
            was_abandon: false,
        })
        .await
        .unwrap()
        .unwrap();

    assert!(h.tracker.send(CanRequestNewMatchForLobby).await.unwrap());
    h.tracker
        .send(RequestNewMatchForLobby {
            new_map: "pl_badwater".to_string(),
        })
        .await
        .unwrap()
        .unwrap();

    assert!(h.tracker.send(BPendingNewMatch).await.unwrap());
    assert!(!h.tracker.send(CanRequestNewMatchForLobby).await.unwrap());
    assert!(!h.tracker.send(CanChangeMatchPlayerTeams).await.unwrap());
    let second = h
        .tracker
        .send(RequestNewMatchForLobby {
            new_map: "cp_dustbowl".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(second, Err(MatchError::NewMatchPending));

    // 전환 전까지는 이전 매치를 그대로 추적한다
    assert_eq!(h.snapshot().await.match_id, Some(500));

    tokio::time::sleep(Duration::from_millis(1_300)).await;

    assert!(!h.tracker.send(BPendingNewMatch).await.unwrap());
    let info = h.snapshot().await;
    assert_eq!(info.match_id, Some(9001));
    assert_eq!(info.map, "pl_badwater");
    assert!(!info.unofficial);
    // 드롭된 플레이어는 새 매치로 넘어가지 않는다
    assert!(info.player(3).is_none());
    assert_eq!(info.num_live_players(), 2);
    assert_eq!(h.session.identity.current(), Some(9001));

    let requests = h.mock.sent_of(GcMessageType::NewMatchForLobbyRequest);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["current_match_id"], 500);
}

#[actix_web::test]
async fn test_refused_new_match_is_unofficial_and_not_recorded() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    h.mock.reply_payload(
        GcMessageType::NewMatchForLobbyRequest,
        json!({ "success": false }),
    );

    h.tracker
        .send(RequestNewMatchForLobby {
            new_map: "pl_upward".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_300)).await;

    let info = h.snapshot().await;
    assert!(info.unofficial);
    assert_eq!(info.match_id, None);
    assert_eq!(info.map, "pl_upward");

    h.tracker
        .send(EndMatch {
            winning_team: Team::Blue,
        })
        .await
        .unwrap()
        .unwrap();
    wait_for_idle(&h.session).await;

    assert!(h.mock.sent_of(GcMessageType::MatchResult).is_empty());
}

#[actix_web::test]
async fn test_new_match_not_allowed_for_ladder() {
    let h = Harness::start(MatchGroup::Ladder6v6).await;

    assert!(!h.tracker.send(CanRequestNewMatchForLobby).await.unwrap());
    let result = h
        .tracker
        .send(RequestNewMatchForLobby {
            new_map: "cp_process_final".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(result, Err(MatchError::NewMatchNotAllowed));
    assert!(!h.tracker.send(CanChangeMatchPlayerTeams).await.unwrap());
}

#[actix_web::test]
async fn test_team_change_is_reverted_when_coordinator_refuses() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    h.mock.set_connected(false);
    h.mock.reply_payload(
        GcMessageType::ChangeMatchPlayerTeamsRequest,
        json!({ "success": false }),
    );

    assert!(h.tracker.send(CanChangeMatchPlayerTeams).await.unwrap());
    h.tracker
        .send(ChangeMatchPlayerTeams {
            changes: vec![TeamAssignment {
                steam_id: 1,
                team: Team::Blue,
            }],
        })
        .await
        .unwrap()
        .unwrap();

    // 낙관적으로 먼저 적용된다
    let info = h.snapshot().await;
    assert_eq!(info.player(1).unwrap().team, Team::Blue);
    assert_eq!(info.num_live_players_for_team(Team::Blue), 2);

    h.mock.set_connected(true);
    wait_for_idle(&h.session).await;

    let info = h.snapshot().await;
    assert_eq!(info.player(1).unwrap().team, Team::Red);

    let sent = h.mock.sent_of(GcMessageType::ChangeMatchPlayerTeamsRequest);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["match_id"], 500);
    assert_eq!(sent[0]["members"][0]["team"], "blue");
}

#[actix_web::test]
async fn test_team_change_for_dropped_player_is_rejected_whole() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    h.tracker
        .send(DropPlayer {
            steam_id: 2,
            reason: DropReason::Left,
            was_abandon: false,
        })
        .await
        .unwrap()
        .unwrap();

    let result = h
        .tracker
        .send(ChangeMatchPlayerTeams {
            changes: vec![
                TeamAssignment {
                    steam_id: 1,
                    team: Team::Blue,
                },
                TeamAssignment {
                    steam_id: 2,
                    team: Team::Red,
                },
            ],
        })
        .await
        .unwrap();

    assert_eq!(result, Err(MatchError::PlayerDropped(2)));
    assert_eq!(h.snapshot().await.player(1).unwrap().team, Team::Red);
}

#[actix_web::test]
async fn test_handled_vote_kick_waits_for_coordinator() {
    let h = Harness::start(MatchGroup::MvmMannUp).await;
    let collector = DecisionCollector::default();
    let seen = collector.seen.clone();
    h.tracker
        .send(SetVoteKickListener(collector.start().recipient()))
        .await
        .unwrap();
    h.mock.set_connected(false);

    let decision = h
        .tracker
        .send(PlayerRequestVoteKick {
            initiator: 1,
            target: 2,
        })
        .await
        .unwrap();
    assert_eq!(decision, VoteKickDecision::Handled);
    assert!(h.tracker.send(BVoteKickPending { target: 2 }).await.unwrap());
    assert_eq!(h.snapshot().await.player(1).unwrap().vote_kick_attempts, 0);

    // 같은 대상에 대한 두 번째 요청은 거부
    let again = h
        .tracker
        .send(PlayerRequestVoteKick {
            initiator: 3,
            target: 2,
        })
        .await
        .unwrap();
    assert_eq!(again, VoteKickDecision::Deny);

    h.mock.set_connected(true);
    wait_for_idle(&h.session).await;

    assert!(!h.tracker.send(BVoteKickPending { target: 2 }).await.unwrap());
    assert_eq!(h.snapshot().await.player(1).unwrap().vote_kick_attempts, 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![VoteKickDecided {
            initiator: 1,
            target: 2,
            decision: VoteKickDecision::Allow,
        }]
    );
}

#[actix_web::test]
async fn test_practice_vote_kick_is_decided_locally() {
    let h = Harness::start(MatchGroup::MvmPractice).await;

    let decision = h
        .tracker
        .send(PlayerRequestVoteKick {
            initiator: 1,
            target: 2,
        })
        .await
        .unwrap();

    assert_eq!(decision, VoteKickDecision::Allow);
    assert_eq!(h.snapshot().await.player(1).unwrap().vote_kick_attempts, 1);
    wait_for_idle(&h.session).await;
    assert!(h.mock.sent_of(GcMessageType::VoteKickCheckRequest).is_empty());
}

#[actix_web::test]
async fn test_passed_vote_kick_drops_target() {
    let h = Harness::start(MatchGroup::MvmMannUp).await;

    h.tracker
        .send(SubmitVoteKickResults {
            initiator: 1,
            target: 2,
            passed: true,
        })
        .await
        .unwrap()
        .unwrap();

    assert!(h
        .tracker
        .send(BPlayerWasVoteKicked { steam_id: 2 })
        .await
        .unwrap());
    assert_eq!(
        h.snapshot().await.player(2).unwrap().state,
        ConnectionState::Dropped(DropReason::VoteKicked)
    );

    wait_for_idle(&h.session).await;
    assert_eq!(
        h.mock.sent_types(),
        vec![GcMessageType::VoteKickResult, GcMessageType::PlayerLeftMatch]
    );
    let left = h.mock.sent_of(GcMessageType::PlayerLeftMatch);
    assert_eq!(left[0]["reason"], "vote_kicked");
}

#[actix_web::test]
async fn test_think_charges_abandon_after_threshold() {
    let h = Harness::start(MatchGroup::Ladder6v6).await;
    h.tracker
        .send(ClientDisconnected { steam_id: 2 })
        .await
        .unwrap()
        .unwrap();

    h.tracker
        .send(Think {
            now: Utc::now() + chrono::Duration::seconds(10),
        })
        .await
        .unwrap();
    assert!(h.snapshot().await.player(2).unwrap().is_live());

    h.tracker
        .send(Think {
            now: Utc::now() + chrono::Duration::seconds(60),
        })
        .await
        .unwrap();

    let info = h.snapshot().await;
    let player = info.player(2).unwrap();
    assert_eq!(player.state, ConnectionState::Dropped(DropReason::Abandoned));
    assert!(player.was_abandon);
    assert_eq!(info.player(1).unwrap().state, ConnectionState::Active);

    // 이미 드롭된 플레이어를 다시 드롭하면 상태는 바뀌지 않는다
    let again = h
        .tracker
        .send(DropPlayer {
            steam_id: 2,
            reason: DropReason::Left,
            was_abandon: false,
        })
        .await
        .unwrap();
    assert_eq!(again, Err(MatchError::PlayerDropped(2)));

    wait_for_idle(&h.session).await;
    let left = h.mock.sent_of(GcMessageType::PlayerLeftMatch);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["steam_id"], 2);
    assert_eq!(left[0]["was_abandon"], true);
}

#[actix_web::test]
async fn test_end_match_reports_result_once() {
    let h = Harness::start(MatchGroup::Ladder6v6).await;
    h.tracker
        .send(AddPlayerScore {
            steam_id: 1,
            points: 4,
        })
        .await
        .unwrap()
        .unwrap();

    h.tracker
        .send(EndMatch {
            winning_team: Team::Red,
        })
        .await
        .unwrap()
        .unwrap();
    let again = h
        .tracker
        .send(EndMatch {
            winning_team: Team::Blue,
        })
        .await
        .unwrap();
    assert_eq!(again, Err(MatchError::MatchEnded));

    // 끝난 매치에서 나가는 건 abandon 이 아니다
    h.tracker
        .send(ClientDisconnected { steam_id: 3 })
        .await
        .unwrap()
        .unwrap();

    wait_for_idle(&h.session).await;

    let info = h.snapshot().await;
    assert!(info.result_sent);
    assert_eq!(
        info.player(3).unwrap().state,
        ConnectionState::Dropped(DropReason::MatchEnded)
    );

    let results = h.mock.sent_of(GcMessageType::MatchResult);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["winning_team"], "red");
    assert_eq!(results[0]["players"][0]["score"], 4);
}

#[actix_web::test]
async fn test_configured_game_event_forces_stats_update() {
    let h = Harness::start(MatchGroup::MvmMannUp).await;

    h.tracker
        .send(GameEvent {
            name: "teamplay_round_start".to_string(),
        })
        .await
        .unwrap();
    h.tracker
        .send(GameEvent {
            name: "mvm_wave_complete".to_string(),
        })
        .await
        .unwrap();
    wait_for_idle(&h.session).await;

    let stats = h.mock.sent_of(GcMessageType::MatchStatsUpdate);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["match_id"], 500);
    assert_eq!(stats[0]["players"].as_array().unwrap().len(), 3);
}

/// Requests a rolling match while the coordinator is away and waits past the switch delay.
async fn roll_over_without_reply(h: &Harness) {
    h.mock.set_connected(false);
    h.tracker
        .send(RequestNewMatchForLobby {
            new_map: "pl_upward".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_300)).await;

    let info = h.snapshot().await;
    assert_eq!(info.map, "pl_upward");
    assert_eq!(info.match_id, None);
    assert!(info.awaiting_match_id);
    assert_eq!(info.previous_match_id, Some(500));
}

#[actix_web::test]
async fn test_speculative_match_takes_id_from_late_reply() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    roll_over_without_reply(&h).await;

    h.mock.set_connected(true);
    wait_for_idle(&h.session).await;

    let info = h.snapshot().await;
    assert_eq!(info.match_id, Some(9001));
    assert!(!info.awaiting_match_id);
    assert!(!info.unofficial);
    assert_eq!(h.session.identity.current(), Some(9001));
}

#[actix_web::test]
async fn test_speculative_match_is_unofficial_after_late_refusal() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    h.mock.reply_payload(
        GcMessageType::NewMatchForLobbyRequest,
        json!({ "success": false }),
    );
    roll_over_without_reply(&h).await;

    h.mock.set_connected(true);
    wait_for_idle(&h.session).await;

    let info = h.snapshot().await;
    assert!(info.unofficial);
    assert_eq!(info.match_id, None);
    assert_eq!(h.session.identity.current(), None);

    h.tracker
        .send(EndMatch {
            winning_team: Team::Red,
        })
        .await
        .unwrap()
        .unwrap();
    wait_for_idle(&h.session).await;
    assert!(h.mock.sent_of(GcMessageType::MatchResult).is_empty());
}

#[actix_web::test]
async fn test_stale_lobby_does_not_hand_old_id_to_next_match() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    roll_over_without_reply(&h).await;

    // 코디네이터가 아직 lobby 를 갱신하지 않아 이전 매치 id 가 그대로 온다
    h.tracker
        .send(LobbyUpdated(lobby(
            MatchGroup::Casual12v12,
            vec![member(1, Team::Red), member(2, Team::Blue), member(3, Team::Red)],
        )))
        .await
        .unwrap();
    let info = h.snapshot().await;
    assert_eq!(info.match_id, None);
    assert!(info.awaiting_match_id);

    h.tracker
        .send(DropPlayer {
            steam_id: 3,
            reason: DropReason::Left,
            was_abandon: false,
        })
        .await
        .unwrap()
        .unwrap();

    h.mock.set_connected(true);
    wait_for_idle(&h.session).await;

    assert_eq!(h.snapshot().await.match_id, Some(9001));
    let left = h.mock.sent_of(GcMessageType::PlayerLeftMatch);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["steam_id"], 3);
    assert_eq!(left[0]["match_id"], 9001);
}

#[actix_web::test]
async fn test_pending_vote_kick_is_denied_when_match_rolls_over() {
    let h = Harness::start(MatchGroup::Casual12v12).await;
    let collector = DecisionCollector::default();
    let seen = collector.seen.clone();
    h.tracker
        .send(SetVoteKickListener(collector.start().recipient()))
        .await
        .unwrap();
    h.mock.set_connected(false);

    let decision = h
        .tracker
        .send(PlayerRequestVoteKick {
            initiator: 1,
            target: 2,
        })
        .await
        .unwrap();
    assert_eq!(decision, VoteKickDecision::Handled);

    roll_over_without_reply(&h).await;

    assert!(!h.tracker.send(BVoteKickPending { target: 2 }).await.unwrap());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![VoteKickDecided {
            initiator: 1,
            target: 2,
            decision: VoteKickDecision::Deny,
        }]
    );

    // 새 매치에서 다시 요청하면 새 id 로 확인한다
    let again = h
        .tracker
        .send(PlayerRequestVoteKick {
            initiator: 1,
            target: 2,
        })
        .await
        .unwrap();
    assert_eq!(again, VoteKickDecision::Handled);

    h.mock.set_connected(true);
    wait_for_idle(&h.session).await;

    // 이전 매치에 대한 늦은 응답은 다시 전달되지 않는다
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            VoteKickDecided {
                initiator: 1,
                target: 2,
                decision: VoteKickDecision::Deny,
            },
            VoteKickDecided {
                initiator: 1,
                target: 2,
                decision: VoteKickDecision::Allow,
            },
        ]
    );
    let checks = h.mock.sent_of(GcMessageType::VoteKickCheckRequest);
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0]["match_id"], 500);
    assert_eq!(checks[1]["match_id"], 9001);
}
