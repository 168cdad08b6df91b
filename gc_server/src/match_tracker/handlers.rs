use actix::{Context, Handler, MessageResult};

use super::{
    messages::{
        AddPlayer, AddPlayerScore, BPendingNewMatch, BPlayerWasVoteKicked, BVoteKickPending,
        CanChangeMatchPlayerTeams, CanRequestNewMatchForLobby, ChangeMatchPlayerTeams,
        ClientActive, ClientConnected, ClientDisconnected, DropPlayer, EndMatch, GameEvent,
        GetMatchSnapshot, LobbyUpdated, MatchResultReplied, NewMatchReplied,
        PendingNewMatchElapsed, PlayerRequestVoteKick, RequestNewMatchForLobby,
        SetVoteKickListener, SubmitVoteKickResults, TeamChangeConfirmed, Think,
        VoteKickCheckReplied,
    },
    MatchTracker,
};
use crate::error::MatchError;

/// Logs and counts a rejected call, then hands the result back unchanged.
fn checked(act: &MatchTracker, action: &str, result: Result<(), MatchError>) -> Result<(), MatchError> {
    if let Err(e) = &result {
        act.violation(action, e);
    }
    result
}

impl Handler<ClientConnected> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: ClientConnected, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.client_connected(msg.steam_id, msg.ent_index);
        checked(self, "client connect", result)
    }
}

impl Handler<ClientActive> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: ClientActive, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.client_active(msg.steam_id);
        checked(self, "client active", result)
    }
}

impl Handler<ClientDisconnected> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: ClientDisconnected, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.client_disconnected(msg.steam_id);
        checked(self, "client disconnect", result)
    }
}

impl Handler<AddPlayer> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: AddPlayer, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.add_player(&msg.member, msg.late_join, msg.ent_index, msg.active);
        checked(self, "add player", result)
    }
}

impl Handler<DropPlayer> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: DropPlayer, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.drop_player(msg.steam_id, msg.reason, msg.was_abandon);
        checked(self, "drop player", result)
    }
}

impl Handler<AddPlayerScore> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: AddPlayerScore, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self
            .active_match()
            .and_then(|info| info.add_score(msg.steam_id, msg.points));
        checked(self, "add score", result)
    }
}

impl Handler<LobbyUpdated> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: LobbyUpdated, ctx: &mut Context<Self>) -> Self::Result {
        self.on_lobby_updated(msg.0, ctx);
    }
}

impl Handler<EndMatch> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: EndMatch, ctx: &mut Context<Self>) -> Self::Result {
        let result = self.end_match(msg.winning_team, ctx);
        checked(self, "end match", result)
    }
}

impl Handler<CanRequestNewMatchForLobby> for MatchTracker {
    type Result = bool;

    fn handle(&mut self, _msg: CanRequestNewMatchForLobby, _ctx: &mut Context<Self>) -> Self::Result {
        self.can_request_new_match_for_lobby()
    }
}

impl Handler<BPendingNewMatch> for MatchTracker {
    type Result = bool;

    fn handle(&mut self, _msg: BPendingNewMatch, _ctx: &mut Context<Self>) -> Self::Result {
        self.pending_new_match()
    }
}

impl Handler<RequestNewMatchForLobby> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: RequestNewMatchForLobby, ctx: &mut Context<Self>) -> Self::Result {
        let result = self.request_new_match_for_lobby(msg.new_map, ctx);
        checked(self, "new match request", result)
    }
}

impl Handler<CanChangeMatchPlayerTeams> for MatchTracker {
    type Result = bool;

    fn handle(&mut self, _msg: CanChangeMatchPlayerTeams, _ctx: &mut Context<Self>) -> Self::Result {
        self.can_change_match_player_teams()
    }
}

impl Handler<ChangeMatchPlayerTeams> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: ChangeMatchPlayerTeams, ctx: &mut Context<Self>) -> Self::Result {
        let result = self.change_match_player_teams(msg.changes, ctx);
        checked(self, "team change", result)
    }
}

impl Handler<PlayerRequestVoteKick> for MatchTracker {
    type Result = MessageResult<PlayerRequestVoteKick>;

    fn handle(&mut self, msg: PlayerRequestVoteKick, ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.player_request_vote_kick(msg.initiator, msg.target, ctx))
    }
}

impl Handler<SubmitVoteKickResults> for MatchTracker {
    type Result = Result<(), MatchError>;

    fn handle(&mut self, msg: SubmitVoteKickResults, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.submit_vote_kick_results(msg.initiator, msg.target, msg.passed);
        checked(self, "vote kick result", result)
    }
}

impl Handler<BVoteKickPending> for MatchTracker {
    type Result = bool;

    fn handle(&mut self, msg: BVoteKickPending, _ctx: &mut Context<Self>) -> Self::Result {
        self.vote_kicks.is_pending(msg.target)
    }
}

impl Handler<BPlayerWasVoteKicked> for MatchTracker {
    type Result = bool;

    fn handle(&mut self, msg: BPlayerWasVoteKicked, _ctx: &mut Context<Self>) -> Self::Result {
        self.vote_kicks.was_vote_kicked(msg.steam_id)
    }
}

impl Handler<SetVoteKickListener> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: SetVoteKickListener, _ctx: &mut Context<Self>) -> Self::Result {
        self.vote_kick_listener = Some(msg.0);
    }
}

impl Handler<GameEvent> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: GameEvent, _ctx: &mut Context<Self>) -> Self::Result {
        self.on_game_event(&msg.name);
    }
}

impl Handler<Think> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: Think, _ctx: &mut Context<Self>) -> Self::Result {
        self.think(msg.now);
    }
}

impl Handler<GetMatchSnapshot> for MatchTracker {
    type Result = MessageResult<GetMatchSnapshot>;

    fn handle(&mut self, _msg: GetMatchSnapshot, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.match_info.clone())
    }
}

// --- Coordinator replies ---

impl Handler<NewMatchReplied> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: NewMatchReplied, _ctx: &mut Context<Self>) -> Self::Result {
        self.on_new_match_replied(msg.generation, msg.response);
    }
}

impl Handler<PendingNewMatchElapsed> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: PendingNewMatchElapsed, _ctx: &mut Context<Self>) -> Self::Result {
        self.on_pending_new_match_elapsed(msg.generation);
    }
}

impl Handler<TeamChangeConfirmed> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: TeamChangeConfirmed, _ctx: &mut Context<Self>) -> Self::Result {
        self.on_team_change_confirmed(msg.generation, msg.changes, msg.accepted);
    }
}

impl Handler<VoteKickCheckReplied> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: VoteKickCheckReplied, _ctx: &mut Context<Self>) -> Self::Result {
        self.on_vote_kick_check_replied(msg.generation, msg.initiator, msg.target, msg.allowed);
    }
}

impl Handler<MatchResultReplied> for MatchTracker {
    type Result = ();

    fn handle(&mut self, msg: MatchResultReplied, _ctx: &mut Context<Self>) -> Self::Result {
        self.on_match_result_replied(msg.generation, msg.recorded);
    }
}
