use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::match_info::MatchInfo;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteKickDecision {
    /// The vote may start now.
    Allow,
    Deny,
    /// The coordinator has to decide. The answer arrives later as a `VoteKickDecided`.
    Handled,
}

impl VoteKickDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKickDecision::Allow => "allow",
            VoteKickDecision::Deny => "deny",
            VoteKickDecision::Handled => "handled",
        }
    }
}

/// 투표 강퇴 진행 상황. 대상(target) 기준으로 코디네이터 확인 대기 중인 요청과 강퇴된 플레이어를 기록한다.
#[derive(Default, Debug)]
pub struct VoteKickBook {
    /// target -> initiator, waiting on the coordinator.
    pending: HashMap<u64, u64>,
    kicked: HashSet<u64>,
}

impl VoteKickBook {
    pub fn is_pending(&self, target: u64) -> bool {
        self.pending.contains_key(&target)
    }

    pub fn was_vote_kicked(&self, steam_id: u64) -> bool {
        self.kicked.contains(&steam_id)
    }

    /// Decides a new vote-kick request.
    ///
    /// `Handled` only records the pending check; the initiator's attempt counter is left alone
    /// until `on_check_response` runs.
    pub fn request(
        &mut self,
        info: &mut MatchInfo,
        initiator: u64,
        target: u64,
        needs_coordinator: bool,
    ) -> VoteKickDecision {
        let both_live = [initiator, target]
            .iter()
            .all(|id| info.player(*id).map_or(false, |p| p.is_live()));

        if info.ended || initiator == target || !both_live || self.is_pending(target) {
            return VoteKickDecision::Deny;
        }

        if needs_coordinator {
            self.pending.insert(target, initiator);
            return VoteKickDecision::Handled;
        }

        match info.record_vote_kick_attempt(initiator) {
            Ok(_) => VoteKickDecision::Allow,
            Err(_) => VoteKickDecision::Deny,
        }
    }

    /// Applies the coordinator's answer. `None` when nothing was pending for this pair.
    pub fn on_check_response(
        &mut self,
        info: Option<&mut MatchInfo>,
        initiator: u64,
        target: u64,
        allowed: bool,
    ) -> Option<VoteKickDecision> {
        if self.pending.get(&target) != Some(&initiator) {
            return None;
        }
        self.pending.remove(&target);

        let Some(info) = info else {
            return Some(VoteKickDecision::Deny);
        };
        let still_live = [initiator, target]
            .iter()
            .all(|id| info.player(*id).map_or(false, |p| p.is_live()));

        if allowed && still_live && info.record_vote_kick_attempt(initiator).is_ok() {
            Some(VoteKickDecision::Allow)
        } else {
            Some(VoteKickDecision::Deny)
        }
    }

    pub fn mark_kicked(&mut self, target: u64) {
        self.pending.remove(&target);
        self.kicked.insert(target);
    }

    /// Forget pending checks that involve a player who is gone.
    pub fn forget_player(&mut self, steam_id: u64) {
        self.pending
            .retain(|target, initiator| *target != steam_id && *initiator != steam_id);
    }

    /// Removes every pending check, as (initiator, target) pairs ordered by target.
    pub fn take_pending(&mut self) -> Vec<(u64, u64)> {
        let mut pairs: Vec<(u64, u64)> = self
            .pending
            .drain()
            .map(|(target, initiator)| (initiator, target))
            .collect();
        pairs.sort_by_key(|(_, target)| *target);
        pairs
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.kicked.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::match_tracker::lobby::LobbyMember;
    use crate::protocol::{DropReason, MatchGroup, Team};

    fn match_with_players(ids: &[u64]) -> MatchInfo {
        let now = Utc::now();
        let mut info = MatchInfo::new(Some(1), 1, MatchGroup::MvmMannUp, "mvm_coaltown", now);
        for id in ids {
            let member = LobbyMember {
                steam_id: *id,
                party_id: None,
                team: Team::Red,
                skill_rating: 0.0,
            };
            info.add_player(&member, false, Some(*id as u32), true, now).unwrap();
        }
        info
    }

    #[test]
    fn test_handled_does_not_touch_attempts() {
        let mut info = match_with_players(&[1, 2]);
        let mut book = VoteKickBook::default();

        let decision = book.request(&mut info, 1, 2, true);

        assert_eq!(decision, VoteKickDecision::Handled);
        assert!(book.is_pending(2));
        assert_eq!(info.player(1).unwrap().vote_kick_attempts, 0);

        let answer = book.on_check_response(Some(&mut info), 1, 2, true);
        assert_eq!(answer, Some(VoteKickDecision::Allow));
        assert!(!book.is_pending(2));
        assert_eq!(info.player(1).unwrap().vote_kick_attempts, 1);
    }

    #[test]
    fn test_denied_response_leaves_attempts() {
        let mut info = match_with_players(&[1, 2]);
        let mut book = VoteKickBook::default();

        book.request(&mut info, 1, 2, true);
        let answer = book.on_check_response(Some(&mut info), 1, 2, false);

        assert_eq!(answer, Some(VoteKickDecision::Deny));
        assert_eq!(info.player(1).unwrap().vote_kick_attempts, 0);
    }

    #[test]
    fn test_second_request_for_pending_target_is_denied() {
        let mut info = match_with_players(&[1, 2, 3]);
        let mut book = VoteKickBook::default();

        assert_eq!(book.request(&mut info, 1, 2, true), VoteKickDecision::Handled);
        assert_eq!(book.request(&mut info, 3, 2, true), VoteKickDecision::Deny);
        // 다른 initiator 의 응답은 무시
        assert_eq!(book.on_check_response(Some(&mut info), 3, 2, true), None);
        assert!(book.is_pending(2));
    }

    #[test]
    fn test_take_pending_empties_the_book() {
        let mut info = match_with_players(&[1, 2, 3]);
        let mut book = VoteKickBook::default();
        book.request(&mut info, 1, 3, true);
        book.request(&mut info, 3, 2, true);

        assert_eq!(book.take_pending(), vec![(3, 2), (1, 3)]);
        assert!(!book.is_pending(2));
        assert!(book.take_pending().is_empty());
    }

    #[test]
    fn test_allow_without_coordinator_counts_immediately() {
        let mut info = match_with_players(&[1, 2]);
        let mut book = VoteKickBook::default();

        assert_eq!(book.request(&mut info, 1, 2, false), VoteKickDecision::Allow);
        assert_eq!(info.player(1).unwrap().vote_kick_attempts, 1);
    }

    #[test]
    fn test_deny_for_dropped_or_self_target() {
        let mut info = match_with_players(&[1, 2]);
        let mut book = VoteKickBook::default();
        info.drop_player(2, DropReason::Left, false, Utc::now()).unwrap();

        assert_eq!(book.request(&mut info, 1, 2, false), VoteKickDecision::Deny);
        assert_eq!(book.request(&mut info, 1, 1, false), VoteKickDecision::Deny);
        assert_eq!(book.request(&mut info, 1, 42, false), VoteKickDecision::Deny);
    }
}
