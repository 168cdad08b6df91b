use serde::{Deserialize, Serialize};

use crate::protocol::{MatchGroup, Team};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LobbyState {
    UserSetup,
    ServerSetup,
    RunGame,
}

/// One member as the coordinator lists them on the lobby.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LobbyMember {
    pub steam_id: u64,
    #[serde(default)]
    pub party_id: Option<u64>,
    #[serde(default)]
    pub team: Team,
    #[serde(default)]
    pub skill_rating: f32,
}

/// Local mirror of the coordinator's authoritative lobby object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LobbySnapshot {
    pub lobby_id: u64,
    pub match_id: Option<u64>,
    pub state: LobbyState,
    pub match_group: MatchGroup,
    pub map: String,
    pub members: Vec<LobbyMember>,
}

impl LobbySnapshot {
    pub fn member(&self, steam_id: u64) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.steam_id == steam_id)
    }

    pub fn is_running(&self) -> bool {
        self.state == LobbyState::RunGame
    }
}
