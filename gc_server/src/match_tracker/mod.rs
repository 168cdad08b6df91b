use actix::{Actor, Addr, AsyncContext, Context, Recipient, SpawnHandle};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    env::MatchTrackingSettings,
    error::MatchError,
    protocol::{DropReason, NewMatchForLobbyResponse, Team, TeamAssignment},
    session::GcSession,
};

use self::{
    lobby::{LobbyMember, LobbySnapshot},
    match_info::MatchInfo,
    messages::{PendingNewMatchElapsed, Think, VoteKickDecided},
    vote_kick::{VoteKickBook, VoteKickDecision},
};

pub mod handlers;
pub mod lobby;
pub mod match_info;
pub mod messages;
pub mod outbound;
pub mod vote_kick;

struct PendingNewMatch {
    map: String,
    requested_at: DateTime<Utc>,
    timer: SpawnHandle,
    response: Option<NewMatchForLobbyResponse>,
}

/// 현재 매치의 로컬 미러. 엔진 콜백과 코디네이터 지시를 받아 플레이어 상태를 갱신한다.
///
/// 팀 변경은 낙관적으로 즉시 적용하고, 코디네이터가 거절하면 되돌린다.
/// 새 매치 전환 대기 중에는 lobby 가 이미 새 매치를 가리켜도 이전 매치를 유지한다.
pub struct MatchTracker {
    session: GcSession,
    settings: MatchTrackingSettings,
    match_info: Option<MatchInfo>,
    /// Bumped whenever `match_info` is replaced; coordinator replies carry it.
    generation: u64,
    pending_new_match: Option<PendingNewMatch>,
    vote_kicks: VoteKickBook,
    vote_kick_listener: Option<Recipient<VoteKickDecided>>,
    last_stats_sent: Option<DateTime<Utc>>,
}

impl MatchTracker {
    pub fn new(session: GcSession, settings: MatchTrackingSettings) -> Self {
        Self {
            session,
            settings,
            match_info: None,
            generation: 0,
            pending_new_match: None,
            vote_kicks: VoteKickBook::default(),
            vote_kick_listener: None,
            last_stats_sent: None,
        }
    }

    fn active_match(&mut self) -> Result<&mut MatchInfo, MatchError> {
        self.match_info.as_mut().ok_or(MatchError::NoActiveMatch)
    }

    fn install_match(&mut self, info: MatchInfo) {
        info!(
            "Tracking match {:?} for lobby {} on {} ({} players)",
            info.match_id,
            info.lobby_id,
            info.map,
            info.players().len()
        );
        if info.match_id.is_some() {
            self.session.identity.set(info.match_id);
        }
        self.generation += 1;
        self.match_info = Some(info);
        self.deny_pending_vote_kicks();
        self.vote_kicks.reset();
        self.last_stats_sent = None;
        self.update_gauges();
    }

    /// 매치가 바뀌면 이전 매치에 대한 코디네이터 응답은 버려지므로, 기다리던 쪽에 거절을 알린다.
    fn deny_pending_vote_kicks(&mut self) {
        for (initiator, target) in self.vote_kicks.take_pending() {
            info!(
                "Vote kick {} -> {} denied: match changed before the coordinator answered",
                initiator, target
            );
            metrics::VOTE_KICK_DECISIONS_TOTAL
                .with_label_values(&[VoteKickDecision::Deny.as_str()])
                .inc();
            if let Some(listener) = &self.vote_kick_listener {
                listener.do_send(VoteKickDecided {
                    initiator,
                    target,
                    decision: VoteKickDecision::Deny,
                });
            }
        }
    }

    fn update_gauges(&self) {
        let live = self.match_info.as_ref().map_or(0, |m| m.num_live_players());
        metrics::MATCH_PLAYERS_ACTIVE.set(live as i64);
    }

    fn violation(&self, action: &str, error: &MatchError) {
        warn!("Rejected {}: {}", action, error);
        metrics::STATE_VIOLATIONS_TOTAL.inc();
    }

    // --- Rolling matches ---

    pub fn pending_new_match(&self) -> bool {
        self.pending_new_match.is_some()
    }

    pub fn can_request_new_match_for_lobby(&self) -> bool {
        self.pending_new_match.is_none()
            && self
                .match_info
                .as_ref()
                .map_or(false, |m| m.match_group.uses_rolling_matches())
    }

    fn request_new_match_for_lobby(
        &mut self,
        new_map: String,
        ctx: &mut Context<Self>,
    ) -> Result<(), MatchError> {
        if self.pending_new_match.is_some() {
            return Err(MatchError::NewMatchPending);
        }
        if !self.can_request_new_match_for_lobby() {
            return Err(MatchError::NewMatchNotAllowed);
        }
        let info = self.active_match()?;
        let (lobby_id, current_match_id) = (info.lobby_id, info.match_id);

        let generation = self.generation;
        let timer = ctx.run_later(self.settings.new_match_delay(), move |_act, ctx| {
            ctx.notify(PendingNewMatchElapsed { generation });
        });

        info!(
            "Requesting new match for lobby {} on {} (switching in {:?})",
            lobby_id,
            new_map,
            self.settings.new_match_delay()
        );
        metrics::NEW_MATCHES_REQUESTED_TOTAL.inc();

        self.session.send_reliable(outbound::new_match_for_lobby(
            lobby_id,
            current_match_id,
            new_map.clone(),
            generation,
            &self.session,
            ctx.address(),
        ));
        self.pending_new_match = Some(PendingNewMatch {
            map: new_map,
            requested_at: Utc::now(),
            timer,
            response: None,
        });
        Ok(())
    }

    fn on_new_match_replied(&mut self, generation: u64, response: NewMatchForLobbyResponse) {
        if let Some(pending) = self.pending_new_match.as_mut() {
            if generation == self.generation {
                pending.response = Some(response);
                return;
            }
        }

        // 전환이 이미 끝났다면 추측으로 만든 매치를 코디네이터 결정과 맞춘다.
        if generation + 1 != self.generation {
            return;
        }
        if let Some(info) = self.match_info.as_mut() {
            apply_new_match_response(info, &response);
        }
    }

    fn on_pending_new_match_elapsed(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        let Some(pending) = self.pending_new_match.take() else {
            return;
        };
        let Some(current) = self.match_info.as_ref() else {
            return;
        };

        let mut next = current.roll_over(None, pending.map, Utc::now());
        match &pending.response {
            Some(response) => apply_new_match_response(&mut next, response),
            None => warn!(
                "Coordinator has not answered the new match request from {}; continuing speculatively",
                pending.requested_at
            ),
        }
        self.install_match(next);
    }

    // --- Team changes ---

    pub fn can_change_match_player_teams(&self) -> bool {
        self.pending_new_match.is_none()
            && self
                .match_info
                .as_ref()
                .map_or(false, |m| !m.ended && m.match_group.allows_team_changes())
    }

    fn change_match_player_teams(
        &mut self,
        changes: Vec<TeamAssignment>,
        ctx: &mut Context<Self>,
    ) -> Result<(), MatchError> {
        if !self.can_change_match_player_teams() {
            return Err(MatchError::TeamChangesNotAllowed);
        }
        let info = self.active_match()?;

        // 전부 검증한 뒤에 적용한다
        for change in &changes {
            let player = info
                .player(change.steam_id)
                .ok_or(MatchError::UnknownPlayer(change.steam_id))?;
            if player.is_dropped() {
                return Err(MatchError::PlayerDropped(change.steam_id));
            }
        }

        let mut applied = Vec::new();
        for change in &changes {
            let previous = info.set_team(change.steam_id, change.team)?;
            if previous != change.team {
                applied.push((change.steam_id, previous, change.team));
            }
        }
        if applied.is_empty() {
            return Ok(());
        }

        let lobby_id = info.lobby_id;
        info!("Moved {} player(s) between teams in lobby {}", applied.len(), lobby_id);
        self.session.send_reliable(outbound::change_match_player_teams(
            lobby_id,
            applied,
            self.generation,
            &self.session,
            ctx.address(),
        ));
        Ok(())
    }

    fn on_team_change_confirmed(&mut self, generation: u64, changes: Vec<(u64, Team, Team)>, accepted: bool) {
        if accepted || generation != self.generation {
            return;
        }
        let Some(info) = self.match_info.as_mut() else {
            return;
        };

        for (steam_id, previous, requested) in changes {
            // 이후 다른 변경이 있었다면 건드리지 않는다
            if info.player(steam_id).map(|p| p.team) != Some(requested) {
                continue;
            }
            match info.set_team(steam_id, previous) {
                Ok(_) => {
                    warn!(
                        "Coordinator rejected team change for {}, reverted to {:?}",
                        steam_id, previous
                    );
                    metrics::TEAM_CHANGES_REVERTED_TOTAL.inc();
                }
                Err(e) => warn!("Could not revert team change for {}: {}", steam_id, e),
            }
        }
    }

    // --- Drops ---

    fn drop_player(
        &mut self,
        steam_id: u64,
        reason: DropReason,
        was_abandon: bool,
    ) -> Result<(), MatchError> {
        let info = self.active_match()?;
        info.drop_player(steam_id, reason, was_abandon, Utc::now())?;
        let (lobby_id, match_id) = (info.lobby_id, info.match_id);

        info!(
            "Player {} dropped from match {:?}: {} (abandon: {})",
            steam_id,
            match_id,
            reason.as_str(),
            was_abandon
        );
        metrics::MATCH_PLAYERS_DROPPED_TOTAL_BY_REASON
            .with_label_values(&[reason.as_str()])
            .inc();

        self.vote_kicks.forget_player(steam_id);
        self.session.send_reliable(outbound::player_left_match(
            lobby_id,
            match_id,
            steam_id,
            reason,
            was_abandon,
            &self.session,
        ));
        self.update_gauges();
        Ok(())
    }

    // --- Vote kicks ---

    fn player_request_vote_kick(
        &mut self,
        initiator: u64,
        target: u64,
        ctx: &mut Context<Self>,
    ) -> VoteKickDecision {
        let generation = self.generation;
        let coordinator_check = self.settings.vote_kick_requires_coordinator;

        let decision = match self.match_info.as_mut() {
            Some(info) => {
                let needs_coordinator =
                    coordinator_check && info.match_group.vote_kick_needs_coordinator();
                self.vote_kicks
                    .request(info, initiator, target, needs_coordinator)
            }
            None => VoteKickDecision::Deny,
        };

        if decision == VoteKickDecision::Handled {
            let match_id = self.match_info.as_ref().and_then(|m| m.match_id);
            self.session.send_reliable(outbound::vote_kick_check(
                match_id,
                initiator,
                target,
                generation,
                &self.session,
                ctx.address(),
            ));
        }

        info!(
            "Vote kick {} -> {}: {}",
            initiator,
            target,
            decision.as_str()
        );
        metrics::VOTE_KICK_DECISIONS_TOTAL
            .with_label_values(&[decision.as_str()])
            .inc();
        decision
    }

    fn on_vote_kick_check_replied(&mut self, generation: u64, initiator: u64, target: u64, allowed: bool) {
        if generation != self.generation {
            return;
        }
        let Some(decision) =
            self.vote_kicks
                .on_check_response(self.match_info.as_mut(), initiator, target, allowed)
        else {
            return;
        };

        info!(
            "Coordinator answered vote kick {} -> {}: {}",
            initiator,
            target,
            decision.as_str()
        );
        if let Some(listener) = &self.vote_kick_listener {
            listener.do_send(VoteKickDecided {
                initiator,
                target,
                decision,
            });
        }
    }

    fn submit_vote_kick_results(
        &mut self,
        initiator: u64,
        target: u64,
        passed: bool,
    ) -> Result<(), MatchError> {
        let info = self.active_match()?;
        if info.player(target).is_none() {
            return Err(MatchError::UnknownPlayer(target));
        }
        let match_id = info.match_id;

        self.session.send_reliable(outbound::vote_kick_result(
            match_id,
            initiator,
            target,
            passed,
            &self.session,
        ));

        if passed {
            self.vote_kicks.mark_kicked(target);
            self.drop_player(target, DropReason::VoteKicked, false)?;
        }
        Ok(())
    }

    // --- Engine callbacks / membership ---

    fn client_connected(&mut self, steam_id: u64, ent_index: Option<u32>) -> Result<(), MatchError> {
        self.active_match()?
            .player_connected(steam_id, ent_index, Utc::now())?;
        self.update_gauges();
        Ok(())
    }

    fn client_active(&mut self, steam_id: u64) -> Result<(), MatchError> {
        self.active_match()?.player_active(steam_id)
    }

    fn client_disconnected(&mut self, steam_id: u64) -> Result<(), MatchError> {
        let info = self.active_match()?;
        if info.ended {
            // 끝난 매치에서 나가는 건 abandon 이 아니다
            return self.drop_player(steam_id, DropReason::MatchEnded, false);
        }
        info.player_disconnected(steam_id, Utc::now())?;
        self.update_gauges();
        Ok(())
    }

    fn add_player(
        &mut self,
        member: &LobbyMember,
        late_join: bool,
        ent_index: Option<u32>,
        active: bool,
    ) -> Result<(), MatchError> {
        let info = self.active_match()?;
        if info.ended {
            return Err(MatchError::MatchEnded);
        }
        info.add_player(member, late_join, ent_index, active, Utc::now())?;
        info!(
            "Player {} joined match {:?} on {:?} (late join: {})",
            member.steam_id, info.match_id, member.team, late_join
        );
        self.update_gauges();
        Ok(())
    }

    fn on_lobby_updated(&mut self, lobby: LobbySnapshot, ctx: &mut Context<Self>) {
        let same_lobby = self
            .match_info
            .as_ref()
            .map_or(false, |m| m.lobby_id == lobby.lobby_id);

        if !same_lobby {
            if let Some(pending) = self.pending_new_match.take() {
                ctx.cancel_future(pending.timer);
            }
            if lobby.is_running() {
                self.install_match(MatchInfo::from_lobby(&lobby, Utc::now()));
            } else if self.match_info.take().is_some() {
                info!("Lobby {} is not running; no match to track", lobby.lobby_id);
                self.session.identity.set(None);
                self.generation += 1;
                self.deny_pending_vote_kicks();
                self.vote_kicks.reset();
                self.update_gauges();
            }
            return;
        }

        // 전환 대기 중인 lobby 는 이미 다음 매치를 가리킬 수 있다
        if self.pending_new_match.is_some() {
            debug!("Lobby {} update deferred until the new match starts", lobby.lobby_id);
            return;
        }

        let now = Utc::now();
        let Some(info) = self.match_info.as_mut() else {
            return;
        };

        if info.awaiting_match_id && !info.unofficial {
            // 코디네이터가 아직 lobby 를 갱신하지 않았으면 이전 매치 id 가 그대로 온다
            let fresh_id = lobby.match_id.filter(|id| Some(*id) != info.previous_match_id);
            if let Some(match_id) = fresh_id {
                info!("Adopting match id {} from lobby {}", match_id, lobby.lobby_id);
                info.match_id = Some(match_id);
                info.awaiting_match_id = false;
                self.session.identity.set(Some(match_id));
            }
        }
        if info.ended {
            return;
        }

        let departed: Vec<u64> = info
            .players()
            .iter()
            .filter(|p| p.is_live() && lobby.member(p.steam_id).is_none())
            .map(|p| p.steam_id)
            .collect();
        for steam_id in departed {
            // 코디네이터가 이미 lobby 에서 뺐으므로 알릴 필요가 없다
            if info.drop_player(steam_id, DropReason::Left, false, now).is_ok() {
                info!("Player {} is no longer in lobby {}", steam_id, lobby.lobby_id);
                metrics::MATCH_PLAYERS_DROPPED_TOTAL_BY_REASON
                    .with_label_values(&[DropReason::Left.as_str()])
                    .inc();
                self.vote_kicks.forget_player(steam_id);
            }
        }

        for member in &lobby.members {
            if info.player(member.steam_id).is_none() {
                info!("Player {} late joined lobby {}", member.steam_id, lobby.lobby_id);
                let _ = info.add_player(member, true, None, false, now);
            }
        }
        self.update_gauges();
    }

    fn on_match_result_replied(&mut self, generation: u64, recorded: bool) {
        if generation != self.generation {
            return;
        }
        if let Some(info) = self.match_info.as_mut() {
            info.result_sent = true;
            if recorded {
                info!("Coordinator recorded the result of match {:?}", info.match_id);
            } else {
                warn!("Coordinator declined the result of match {:?}", info.match_id);
            }
        }
    }

    fn on_game_event(&mut self, name: &str) {
        if self.settings.stats_resend_events.iter().any(|e| e == name) {
            debug!("Game event {} forces a stats update", name);
            self.send_stats(Utc::now());
        }
    }

    // --- End of match / stats ---

    fn end_match(&mut self, winning_team: Team, ctx: &mut Context<Self>) -> Result<(), MatchError> {
        let generation = self.generation;
        let info = self.active_match()?;
        info.end_match()?;

        if info.unofficial {
            warn!(
                "Match for lobby {} ended but is unofficial; result will not be recorded",
                info.lobby_id
            );
            return Ok(());
        }

        let result = info.match_result(winning_team);
        info!("Match {:?} ended, {:?} won", info.match_id, winning_team);
        self.session.send_reliable(outbound::match_result(
            result,
            generation,
            &self.session,
            ctx.address(),
        ));
        Ok(())
    }

    fn send_stats(&mut self, now: DateTime<Utc>) {
        let Some(info) = self.match_info.as_ref() else {
            return;
        };
        if info.ended {
            return;
        }
        self.session
            .send_reliable(outbound::match_stats(info.stats_update(), &self.session));
        self.last_stats_sent = Some(now);
    }

    fn think(&mut self, now: DateTime<Utc>) {
        let Some(info) = self.match_info.as_ref() else {
            return;
        };
        if info.ended {
            return;
        }

        for steam_id in info.abandon_candidates(now, self.settings.abandon_threshold()) {
            warn!("Player {} exceeded the abandon threshold", steam_id);
            if let Err(e) = self.drop_player(steam_id, DropReason::Abandoned, true) {
                self.violation("abandon drop", &e);
            }
        }

        let stats_due = self.last_stats_sent.map_or(true, |last| {
            (now - last).to_std().unwrap_or_default() >= self.settings.stats_resend_interval()
        });
        if stats_due {
            self.send_stats(now);
        }
    }
}

fn apply_new_match_response(info: &mut MatchInfo, response: &NewMatchForLobbyResponse) {
    match (response.success, response.new_match_id) {
        (true, Some(match_id)) => {
            info.match_id = Some(match_id);
            info.awaiting_match_id = false;
        }
        _ => {
            warn!(
                "Coordinator rejected the new match for lobby {}; marking it unofficial",
                info.lobby_id
            );
            info.unofficial = true;
            info.awaiting_match_id = false;
            metrics::UNOFFICIAL_MATCHES_TOTAL.inc();
        }
    }
}

impl Actor for MatchTracker {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("MatchTracker started");
        ctx.run_interval(self.settings.think_interval(), |_act, ctx| {
            ctx.notify(Think { now: Utc::now() });
        });
    }
}

/// Starts a tracker bound to `session` on the current arbiter.
pub fn spawn_match_tracker(session: GcSession, settings: MatchTrackingSettings) -> Addr<MatchTracker> {
    MatchTracker::new(session, settings).start()
}
