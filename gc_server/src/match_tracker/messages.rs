use actix::{Message, Recipient};
use chrono::{DateTime, Utc};

use super::{
    lobby::{LobbyMember, LobbySnapshot},
    match_info::MatchInfo,
    vote_kick::VoteKickDecision,
};
use crate::{
    error::MatchError,
    protocol::{DropReason, NewMatchForLobbyResponse, Team, TeamAssignment},
};

// --- Engine callbacks ---

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct ClientConnected {
    pub steam_id: u64,
    pub ent_index: Option<u32>,
}

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct ClientActive {
    pub steam_id: u64,
}

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct ClientDisconnected {
    pub steam_id: u64,
}

// --- Match membership ---

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct AddPlayer {
    pub member: LobbyMember,
    pub late_join: bool,
    pub ent_index: Option<u32>,
    pub active: bool,
}

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct DropPlayer {
    pub steam_id: u64,
    pub reason: DropReason,
    pub was_abandon: bool,
}

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct AddPlayerScore {
    pub steam_id: u64,
    pub points: i32,
}

/// Coordinator pushed a new version of the lobby object.
#[derive(Message)]
#[rtype(result = "()")]
pub struct LobbyUpdated(pub LobbySnapshot);

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct EndMatch {
    pub winning_team: Team,
}

// --- Rolling matches ---

#[derive(Message)]
#[rtype(result = "bool")]
pub struct CanRequestNewMatchForLobby;

#[derive(Message)]
#[rtype(result = "bool")]
pub struct BPendingNewMatch;

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct RequestNewMatchForLobby {
    pub new_map: String,
}

// --- Team changes ---

#[derive(Message)]
#[rtype(result = "bool")]
pub struct CanChangeMatchPlayerTeams;

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct ChangeMatchPlayerTeams {
    pub changes: Vec<TeamAssignment>,
}

// --- Vote kicks (vote UI surface) ---

#[derive(Message)]
#[rtype(result = "VoteKickDecision")]
pub struct PlayerRequestVoteKick {
    pub initiator: u64,
    pub target: u64,
}

#[derive(Message)]
#[rtype(result = "Result<(), MatchError>")]
pub struct SubmitVoteKickResults {
    pub initiator: u64,
    pub target: u64,
    pub passed: bool,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct BVoteKickPending {
    pub target: u64,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct BPlayerWasVoteKicked {
    pub steam_id: u64,
}

/// Asynchronous answer to a request that returned `Handled`.
#[derive(Message, Clone, Debug, PartialEq)]
#[rtype(result = "()")]
pub struct VoteKickDecided {
    pub initiator: u64,
    pub target: u64,
    pub decision: VoteKickDecision,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct SetVoteKickListener(pub Recipient<VoteKickDecided>);

// --- Game events / ticks ---

#[derive(Message)]
#[rtype(result = "()")]
pub struct GameEvent {
    pub name: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Think {
    pub now: DateTime<Utc>,
}

#[derive(Message)]
#[rtype(result = "Option<MatchInfo>")]
pub struct GetMatchSnapshot;

// --- Coordinator replies (sent by reliable message hooks) ---

#[derive(Message)]
#[rtype(result = "()")]
pub(super) struct NewMatchReplied {
    pub generation: u64,
    pub response: NewMatchForLobbyResponse,
}

#[derive(Message)]
#[rtype(result = "()")]
pub(super) struct PendingNewMatchElapsed {
    pub generation: u64,
}

#[derive(Message)]
#[rtype(result = "()")]
pub(super) struct TeamChangeConfirmed {
    pub generation: u64,
    /// (steam_id, previous team, requested team)
    pub changes: Vec<(u64, Team, Team)>,
    pub accepted: bool,
}

#[derive(Message)]
#[rtype(result = "()")]
pub(super) struct VoteKickCheckReplied {
    pub generation: u64,
    pub initiator: u64,
    pub target: u64,
    pub allowed: bool,
}

#[derive(Message)]
#[rtype(result = "()")]
pub(super) struct MatchResultReplied {
    pub generation: u64,
    pub recorded: bool,
}
