//! Reliable messages the tracker sends to the coordinator.
//!
//! match id 가 아직 없는 메시지는 prepare 단계에서 `MatchIdentity` 로 채운다.
//! 새 매치 응답 훅이 id 를 먼저 기록하므로 큐 뒤쪽 메시지는 새 id 를 보게 된다.

use actix::Addr;
use tracing::warn;

use super::{
    messages::{MatchResultReplied, NewMatchReplied, TeamChangeConfirmed, VoteKickCheckReplied},
    MatchTracker,
};
use crate::{
    protocol::{
        ChangeMatchPlayerTeamsRequest, DropReason, MatchResult, MatchStatsUpdate,
        NewMatchForLobbyRequest, NewMatchForLobbyResponse, PlayerLeftMatch, Team, TeamAssignment,
        VoteKickCheckRequest, VoteKickResult,
    },
    reliable::ReliableMessage,
    session::{GcSession, MatchIdentity},
};

fn stamp(slot: &mut Option<u64>, identity: &MatchIdentity) {
    if slot.is_none() {
        *slot = identity.current();
    }
}

pub fn new_match_for_lobby(
    lobby_id: u64,
    current_match_id: Option<u64>,
    next_map: String,
    generation: u64,
    session: &GcSession,
    tracker: Addr<MatchTracker>,
) -> ReliableMessage<NewMatchForLobbyRequest> {
    let request = NewMatchForLobbyRequest {
        lobby_id,
        current_match_id,
        next_map,
    };
    let prepare_identity = session.identity.clone();
    let reply_identity = session.identity.clone();
    let abort_identity = session.identity.clone();
    let abort_tracker = tracker.clone();

    ReliableMessage::new(request, "new match for lobby")
        .on_queued(|req, tag| tag.push_str(&format!(" lobby={} map={}", req.lobby_id, req.next_map)))
        .prepare(move |req| stamp(&mut req.current_match_id, &prepare_identity))
        .on_reply(move |response: NewMatchForLobbyResponse| {
            // 다음 메시지의 prepare 보다 먼저 반영되어야 한다
            match (response.success, response.new_match_id) {
                (true, Some(match_id)) => reply_identity.set(Some(match_id)),
                _ => reply_identity.set(None),
            }
            tracker.do_send(NewMatchReplied {
                generation,
                response,
            });
        })
        .on_aborted(move |e| {
            warn!("New match request aborted: {}", e);
            abort_identity.set(None);
            abort_tracker.do_send(NewMatchReplied {
                generation,
                response: NewMatchForLobbyResponse {
                    success: false,
                    new_match_id: None,
                },
            });
        })
}

/// `changes` holds (steam_id, previous team, requested team).
pub fn change_match_player_teams(
    lobby_id: u64,
    changes: Vec<(u64, Team, Team)>,
    generation: u64,
    session: &GcSession,
    tracker: Addr<MatchTracker>,
) -> ReliableMessage<ChangeMatchPlayerTeamsRequest> {
    let request = ChangeMatchPlayerTeamsRequest {
        lobby_id,
        match_id: None,
        members: changes
            .iter()
            .map(|(steam_id, _, team)| TeamAssignment {
                steam_id: *steam_id,
                team: *team,
            })
            .collect(),
    };
    let identity = session.identity.clone();
    let abort_tracker = tracker.clone();
    let abort_changes = changes.clone();

    ReliableMessage::new(request, "change match player teams")
        .on_queued(|req, tag| tag.push_str(&format!(" members={}", req.members.len())))
        .prepare(move |req| stamp(&mut req.match_id, &identity))
        .on_reply(move |response| {
            tracker.do_send(TeamChangeConfirmed {
                generation,
                changes,
                accepted: response.success,
            });
        })
        .on_aborted(move |_| {
            abort_tracker.do_send(TeamChangeConfirmed {
                generation,
                changes: abort_changes,
                accepted: false,
            });
        })
}

pub fn player_left_match(
    lobby_id: u64,
    match_id: Option<u64>,
    steam_id: u64,
    reason: DropReason,
    was_abandon: bool,
    session: &GcSession,
) -> ReliableMessage<PlayerLeftMatch> {
    let identity = session.identity.clone();

    ReliableMessage::new(
        PlayerLeftMatch {
            lobby_id,
            match_id,
            steam_id,
            reason,
            was_abandon,
        },
        "player left match",
    )
    .on_queued(|req, tag| tag.push_str(&format!(" player={} reason={}", req.steam_id, req.reason.as_str())))
    .prepare(move |req| stamp(&mut req.match_id, &identity))
}

pub fn vote_kick_check(
    match_id: Option<u64>,
    initiator: u64,
    target: u64,
    generation: u64,
    session: &GcSession,
    tracker: Addr<MatchTracker>,
) -> ReliableMessage<VoteKickCheckRequest> {
    let identity = session.identity.clone();
    let abort_tracker = tracker.clone();

    ReliableMessage::new(
        VoteKickCheckRequest {
            match_id,
            initiator,
            target,
        },
        "vote kick check",
    )
    .on_queued(|req, tag| tag.push_str(&format!(" {}->{}", req.initiator, req.target)))
    .prepare(move |req| stamp(&mut req.match_id, &identity))
    .on_reply(move |response| {
        tracker.do_send(VoteKickCheckReplied {
            generation,
            initiator,
            target,
            allowed: response.allowed,
        });
    })
    .on_aborted(move |_| {
        abort_tracker.do_send(VoteKickCheckReplied {
            generation,
            initiator,
            target,
            allowed: false,
        });
    })
}

pub fn vote_kick_result(
    match_id: Option<u64>,
    initiator: u64,
    target: u64,
    passed: bool,
    session: &GcSession,
) -> ReliableMessage<VoteKickResult> {
    let identity = session.identity.clone();

    ReliableMessage::new(
        VoteKickResult {
            match_id,
            initiator,
            target,
            passed,
        },
        "vote kick result",
    )
    .on_queued(|req, tag| tag.push_str(&format!(" {}->{} passed={}", req.initiator, req.target, req.passed)))
    .prepare(move |req| stamp(&mut req.match_id, &identity))
}

pub fn match_stats(update: MatchStatsUpdate, session: &GcSession) -> ReliableMessage<MatchStatsUpdate> {
    let identity = session.identity.clone();

    ReliableMessage::new(update, "match stats update")
        .prepare(move |req| stamp(&mut req.match_id, &identity))
}

pub fn match_result(
    result: MatchResult,
    generation: u64,
    session: &GcSession,
    tracker: Addr<MatchTracker>,
) -> ReliableMessage<MatchResult> {
    let identity = session.identity.clone();

    ReliableMessage::new(result, "match result")
        .on_queued(|req, tag| tag.push_str(&format!(" lobby={} winner={:?}", req.lobby_id, req.winning_team)))
        .prepare(move |req| stamp(&mut req.match_id, &identity))
        .on_reply(move |response| {
            tracker.do_send(MatchResultReplied {
                generation,
                recorded: response.recorded,
            });
        })
}
