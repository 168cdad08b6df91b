use serde::{de::DeserializeOwned, Deserialize, Serialize};

// --- Wire envelope ---

/// 코디네이터 프로토콜의 메시지 태그. 요청과 응답이 쌍으로 정의된다.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GcMessageType {
    NewMatchForLobbyRequest,
    NewMatchForLobbyResponse,
    ChangeMatchPlayerTeamsRequest,
    ChangeMatchPlayerTeamsResponse,
    PlayerLeftMatch,
    PlayerLeftMatchResponse,
    VoteKickCheckRequest,
    VoteKickCheckResponse,
    VoteKickResult,
    VoteKickResultResponse,
    MatchStatsUpdate,
    MatchStatsUpdateResponse,
    MatchResult,
    MatchResultResponse,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope {
    pub msg_type: GcMessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn encode<T: Serialize>(msg_type: GcMessageType, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            msg_type,
            payload: serde_json::to_value(body)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// A reply body the coordinator sends back for exactly one request type.
pub trait CoordinatorReply: DeserializeOwned + Send + 'static {
    const MSG_TYPE: GcMessageType;
}

/// A request body together with the reply type it must be answered with.
pub trait CoordinatorRequest: Serialize + Send + 'static {
    const MSG_TYPE: GcMessageType;
    type Reply: CoordinatorReply;
}

macro_rules! exchange {
    ($request:ty => $req_tag:ident, $reply:ty => $reply_tag:ident) => {
        impl CoordinatorRequest for $request {
            const MSG_TYPE: GcMessageType = GcMessageType::$req_tag;
            type Reply = $reply;
        }

        impl CoordinatorReply for $reply {
            const MSG_TYPE: GcMessageType = GcMessageType::$reply_tag;
        }
    };
}

// --- Shared domain values ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    #[default]
    Unassigned,
    Red,
    Blue,
}

impl Team {
    pub fn opposite(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
            Team::Unassigned => Team::Unassigned,
        }
    }
}

/// Why a player left the match for good.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Left,
    Abandoned,
    VoteKicked,
    MatchEnded,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Left => "left",
            DropReason::Abandoned => "abandoned",
            DropReason::VoteKicked => "vote_kicked",
            DropReason::MatchEnded => "match_ended",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchGroup {
    MvmPractice,
    MvmMannUp,
    Ladder6v6,
    Ladder9v9,
    Ladder12v12,
    Casual12v12,
}

impl MatchGroup {
    pub fn canonical_team_size(&self) -> u32 {
        match self {
            MatchGroup::MvmPractice | MatchGroup::MvmMannUp => 6,
            MatchGroup::Ladder6v6 => 6,
            MatchGroup::Ladder9v9 => 9,
            MatchGroup::Ladder12v12 | MatchGroup::Casual12v12 => 12,
        }
    }

    /// Lobbies that keep playing on a fresh match once the current one ends.
    pub fn uses_rolling_matches(&self) -> bool {
        matches!(self, MatchGroup::Casual12v12)
    }

    /// Only casual matches may autobalance players across teams.
    pub fn allows_team_changes(&self) -> bool {
        matches!(self, MatchGroup::Casual12v12)
    }

    pub fn is_mvm(&self) -> bool {
        matches!(self, MatchGroup::MvmPractice | MatchGroup::MvmMannUp)
    }

    /// Practice matches carry no penalties, so the coordinator has nothing to check.
    pub fn vote_kick_needs_coordinator(&self) -> bool {
        !matches!(self, MatchGroup::MvmPractice)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TeamAssignment {
    pub steam_id: u64,
    pub team: Team,
}

// --- Request / reply pairs ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewMatchForLobbyRequest {
    pub lobby_id: u64,
    pub current_match_id: Option<u64>,
    pub next_map: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewMatchForLobbyResponse {
    pub success: bool,
    #[serde(default)]
    pub new_match_id: Option<u64>,
}

exchange!(NewMatchForLobbyRequest => NewMatchForLobbyRequest, NewMatchForLobbyResponse => NewMatchForLobbyResponse);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChangeMatchPlayerTeamsRequest {
    pub lobby_id: u64,
    /// Stamped right before sending, so it names whichever match the coordinator assigned last.
    pub match_id: Option<u64>,
    pub members: Vec<TeamAssignment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChangeMatchPlayerTeamsResponse {
    pub success: bool,
}

exchange!(ChangeMatchPlayerTeamsRequest => ChangeMatchPlayerTeamsRequest, ChangeMatchPlayerTeamsResponse => ChangeMatchPlayerTeamsResponse);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerLeftMatch {
    pub lobby_id: u64,
    pub match_id: Option<u64>,
    pub steam_id: u64,
    pub reason: DropReason,
    pub was_abandon: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PlayerLeftMatchResponse {}

exchange!(PlayerLeftMatch => PlayerLeftMatch, PlayerLeftMatchResponse => PlayerLeftMatchResponse);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoteKickCheckRequest {
    pub match_id: Option<u64>,
    pub initiator: u64,
    pub target: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoteKickCheckResponse {
    pub allowed: bool,
}

exchange!(VoteKickCheckRequest => VoteKickCheckRequest, VoteKickCheckResponse => VoteKickCheckResponse);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoteKickResult {
    pub match_id: Option<u64>,
    pub initiator: u64,
    pub target: u64,
    pub passed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct VoteKickResultResponse {}

exchange!(VoteKickResult => VoteKickResult, VoteKickResultResponse => VoteKickResultResponse);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerStats {
    pub steam_id: u64,
    pub team: Team,
    pub score: i32,
    pub connected: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MatchStatsUpdate {
    pub match_id: Option<u64>,
    pub players: Vec<PlayerStats>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct MatchStatsUpdateResponse {}

exchange!(MatchStatsUpdate => MatchStatsUpdate, MatchStatsUpdateResponse => MatchStatsUpdateResponse);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerResult {
    pub steam_id: u64,
    pub team: Team,
    pub score: i32,
    pub drop_reason: Option<DropReason>,
    pub abandoned: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub match_id: Option<u64>,
    pub lobby_id: u64,
    pub map: String,
    pub winning_team: Team,
    pub players: Vec<PlayerResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MatchResultResponse {
    pub recorded: bool,
}

exchange!(MatchResult => MatchResult, MatchResultResponse => MatchResultResponse);
