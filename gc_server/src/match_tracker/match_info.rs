use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::lobby::{LobbyMember, LobbySnapshot};
use crate::{
    error::MatchError,
    protocol::{DropReason, MatchGroup, MatchResult, MatchStatsUpdate, PlayerResult, PlayerStats, Team},
};

/// 플레이어 연결 상태.
///
/// Disconnected → Connected → Active 순으로 진행하고, 엔진 disconnect 시 Disconnected 로 돌아간다.
/// Dropped 는 흡수 상태: 여기서 나가는 전이는 모두 거부된다.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Active,
    Dropped(DropReason),
}

#[derive(Serialize, Clone, Debug)]
pub struct PlayerMatchData {
    pub steam_id: u64,
    pub party_id: Option<u64>,
    pub team: Team,
    pub state: ConnectionState,
    pub ent_index: Option<u32>,
    pub late_join: bool,
    pub join_time: DateTime<Utc>,
    /// Start of the current disconnected window, if any.
    pub disconnected_since: Option<DateTime<Utc>>,
    /// Closed disconnected windows. Never reset within a match.
    pub disconnected_total: Duration,
    pub vote_kick_attempts: u32,
    pub was_abandon: bool,
    pub skill_rating: f32,
    pub score: i32,
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

impl PlayerMatchData {
    fn new(
        member: &LobbyMember,
        late_join: bool,
        ent_index: Option<u32>,
        active: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let state = match (active, ent_index) {
            (true, _) => ConnectionState::Active,
            (false, Some(_)) => ConnectionState::Connected,
            (false, None) => ConnectionState::Disconnected,
        };

        Self {
            steam_id: member.steam_id,
            party_id: member.party_id,
            team: member.team,
            state,
            ent_index,
            late_join,
            join_time: now,
            // 아직 접속하지 않은 플레이어도 미접속 시간이 누적된다 (no-show 도 abandon).
            disconnected_since: (state == ConnectionState::Disconnected).then_some(now),
            disconnected_total: Duration::ZERO,
            vote_kick_attempts: 0,
            was_abandon: false,
            skill_rating: member.skill_rating,
            score: 0,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self.state, ConnectionState::Dropped(_))
    }

    pub fn is_live(&self) -> bool {
        !self.is_dropped()
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self.state {
            ConnectionState::Dropped(reason) => Some(reason),
            _ => None,
        }
    }

    /// Total disconnected time in this match, including an open window.
    pub fn disconnected_duration(&self, now: DateTime<Utc>) -> Duration {
        self.disconnected_total
            + self
                .disconnected_since
                .map_or(Duration::ZERO, |since| elapsed(since, now))
    }

    fn close_disconnect_window(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.disconnected_since.take() {
            self.disconnected_total += elapsed(since, now);
        }
    }

    fn connect(&mut self, ent_index: Option<u32>, now: DateTime<Utc>) -> Result<(), MatchError> {
        match self.state {
            ConnectionState::Dropped(_) => Err(MatchError::PlayerDropped(self.steam_id)),
            ConnectionState::Disconnected => {
                self.close_disconnect_window(now);
                self.state = ConnectionState::Connected;
                self.ent_index = ent_index;
                Ok(())
            }
            ConnectionState::Connected | ConnectionState::Active => Ok(()),
        }
    }

    fn activate(&mut self) -> Result<(), MatchError> {
        match self.state {
            ConnectionState::Dropped(_) => Err(MatchError::PlayerDropped(self.steam_id)),
            ConnectionState::Disconnected => Err(MatchError::PlayerNotConnected(self.steam_id)),
            ConnectionState::Connected | ConnectionState::Active => {
                self.state = ConnectionState::Active;
                Ok(())
            }
        }
    }

    fn disconnect(&mut self, now: DateTime<Utc>) -> Result<(), MatchError> {
        match self.state {
            ConnectionState::Dropped(_) => Err(MatchError::PlayerDropped(self.steam_id)),
            ConnectionState::Disconnected => Ok(()),
            ConnectionState::Connected | ConnectionState::Active => {
                self.state = ConnectionState::Disconnected;
                self.ent_index = None;
                self.disconnected_since = Some(now);
                Ok(())
            }
        }
    }

    fn drop_out(
        &mut self,
        reason: DropReason,
        was_abandon: bool,
        now: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        if self.is_dropped() {
            return Err(MatchError::PlayerDropped(self.steam_id));
        }
        self.close_disconnect_window(now);
        self.state = ConnectionState::Dropped(reason);
        self.ent_index = None;
        self.was_abandon = was_abandon;
        Ok(())
    }
}

/// 진행 중인 매치 하나. 드롭된 플레이어 기록도 남겨 둔다.
#[derive(Serialize, Clone, Debug)]
pub struct MatchInfo {
    pub match_id: Option<u64>,
    pub lobby_id: u64,
    pub match_group: MatchGroup,
    pub map: String,
    pub created_at: DateTime<Utc>,
    pub canonical_team_size: u32,
    pub ended: bool,
    pub result_sent: bool,
    /// The coordinator refused this match; its result is never recorded.
    pub unofficial: bool,
    /// Created speculatively before the coordinator assigned an id.
    pub awaiting_match_id: bool,
    /// Id of the match this one rolled over from. Lobby snapshots may still name it.
    pub previous_match_id: Option<u64>,
    players: Vec<PlayerMatchData>,
}

impl MatchInfo {
    pub fn new(
        match_id: Option<u64>,
        lobby_id: u64,
        match_group: MatchGroup,
        map: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            match_id,
            lobby_id,
            match_group,
            map: map.into(),
            created_at: now,
            canonical_team_size: match_group.canonical_team_size(),
            ended: false,
            result_sent: false,
            unofficial: false,
            awaiting_match_id: match_id.is_none(),
            previous_match_id: None,
            players: Vec::new(),
        }
    }

    /// Match for a lobby that just reached run-game. Every member starts disconnected.
    pub fn from_lobby(lobby: &LobbySnapshot, now: DateTime<Utc>) -> Self {
        let mut info = Self::new(lobby.match_id, lobby.lobby_id, lobby.match_group, &lobby.map, now);
        for member in &lobby.members {
            // 같은 멤버가 두 번 나열된 경우는 무시
            let _ = info.add_player(member, false, None, false, now);
        }
        info
    }

    /// Next match of a rolling lobby. Live players keep team and connection; history starts over.
    pub fn roll_over(&self, match_id: Option<u64>, map: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = Self::new(match_id, self.lobby_id, self.match_group, map, now);
        next.previous_match_id = self.match_id;
        next.players = self
            .players
            .iter()
            .filter(|p| p.is_live())
            .map(|p| PlayerMatchData {
                join_time: now,
                late_join: false,
                disconnected_since: p.disconnected_since.map(|_| now),
                disconnected_total: Duration::ZERO,
                vote_kick_attempts: 0,
                was_abandon: false,
                score: 0,
                ..p.clone()
            })
            .collect();
        next
    }

    pub fn players(&self) -> &[PlayerMatchData] {
        &self.players
    }

    pub fn player(&self, steam_id: u64) -> Option<&PlayerMatchData> {
        self.players.iter().find(|p| p.steam_id == steam_id)
    }

    fn player_mut(&mut self, steam_id: u64) -> Result<&mut PlayerMatchData, MatchError> {
        self.players
            .iter_mut()
            .find(|p| p.steam_id == steam_id)
            .ok_or(MatchError::UnknownPlayer(steam_id))
    }

    pub fn add_player(
        &mut self,
        member: &LobbyMember,
        late_join: bool,
        ent_index: Option<u32>,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        if let Some(existing) = self.player(member.steam_id) {
            return Err(if existing.is_dropped() {
                MatchError::PlayerDropped(member.steam_id)
            } else {
                MatchError::PlayerAlreadyLive(member.steam_id)
            });
        }

        self.players
            .push(PlayerMatchData::new(member, late_join, ent_index, active, now));
        Ok(())
    }

    pub fn player_connected(
        &mut self,
        steam_id: u64,
        ent_index: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        self.player_mut(steam_id)?.connect(ent_index, now)
    }

    pub fn player_active(&mut self, steam_id: u64) -> Result<(), MatchError> {
        self.player_mut(steam_id)?.activate()
    }

    pub fn player_disconnected(&mut self, steam_id: u64, now: DateTime<Utc>) -> Result<(), MatchError> {
        self.player_mut(steam_id)?.disconnect(now)
    }

    pub fn drop_player(
        &mut self,
        steam_id: u64,
        reason: DropReason,
        was_abandon: bool,
        now: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        self.player_mut(steam_id)?.drop_out(reason, was_abandon, now)
    }

    /// Returns the team the player had before.
    pub fn set_team(&mut self, steam_id: u64, team: Team) -> Result<Team, MatchError> {
        if self.ended {
            return Err(MatchError::MatchEnded);
        }
        let player = self.player_mut(steam_id)?;
        if player.is_dropped() {
            return Err(MatchError::PlayerDropped(steam_id));
        }
        Ok(std::mem::replace(&mut player.team, team))
    }

    pub fn add_score(&mut self, steam_id: u64, points: i32) -> Result<(), MatchError> {
        if self.ended {
            return Err(MatchError::MatchEnded);
        }
        self.player_mut(steam_id)?.score += points;
        Ok(())
    }

    pub fn record_vote_kick_attempt(&mut self, steam_id: u64) -> Result<u32, MatchError> {
        let player = self.player_mut(steam_id)?;
        player.vote_kick_attempts += 1;
        Ok(player.vote_kick_attempts)
    }

    pub fn end_match(&mut self) -> Result<(), MatchError> {
        if self.ended {
            return Err(MatchError::MatchEnded);
        }
        self.ended = true;
        Ok(())
    }

    pub fn num_live_players(&self) -> usize {
        self.players.iter().filter(|p| p.is_live()).count()
    }

    pub fn num_live_players_for_team(&self, team: Team) -> usize {
        self.players
            .iter()
            .filter(|p| p.is_live() && p.team == team)
            .count()
    }

    pub fn num_active_players(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.state == ConnectionState::Active)
            .count()
    }

    /// Live, currently disconnected players whose accumulated disconnected time exceeds `threshold`.
    pub fn abandon_candidates(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<u64> {
        self.players
            .iter()
            .filter(|p| p.state == ConnectionState::Disconnected)
            .filter(|p| p.disconnected_duration(now) > threshold)
            .map(|p| p.steam_id)
            .collect()
    }

    pub fn stats_update(&self) -> MatchStatsUpdate {
        MatchStatsUpdate {
            match_id: self.match_id,
            players: self
                .players
                .iter()
                .map(|p| PlayerStats {
                    steam_id: p.steam_id,
                    team: p.team,
                    score: p.score,
                    connected: matches!(
                        p.state,
                        ConnectionState::Connected | ConnectionState::Active
                    ),
                })
                .collect(),
        }
    }

    pub fn match_result(&self, winning_team: Team) -> MatchResult {
        MatchResult {
            match_id: self.match_id,
            lobby_id: self.lobby_id,
            map: self.map.clone(),
            winning_team,
            players: self
                .players
                .iter()
                .map(|p| PlayerResult {
                    steam_id: p.steam_id,
                    team: p.team,
                    score: p.score,
                    drop_reason: p.drop_reason(),
                    abandoned: p.was_abandon,
                })
                .collect(),
        }
    }
}
