use std::collections::HashMap;

use crate::protocol::ServerMessage;
use crate::schema::{Match, MatchId};

/// Subscriber-side view of matches, fed by pushed events.
///
/// Events can arrive out of order across connections, so a copy is only
/// replaced by one with a strictly newer `updated_at`.
#[derive(Debug, Default)]
pub struct MatchCache {
    matches: HashMap<MatchId, Match>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `m` replaced the cached copy.
    pub fn apply(&mut self, m: Match) -> bool {
        match self.matches.get(&m.id) {
            Some(cached) if cached.updated_at >= m.updated_at => false,
            _ => {
                self.matches.insert(m.id, m);
                true
            }
        }
    }

    /// Number of matches the event changed.
    pub fn apply_event(&mut self, event: &ServerMessage) -> usize {
        match event {
            ServerMessage::MatchChanged { game } => usize::from(self.apply(game.clone())),
            ServerMessage::LobbyMatchesChanged { matches, .. } => {
                matches.iter().filter(|m| self.apply((*m).clone())).count()
            }
            ServerMessage::Reply { .. } => 0,
        }
    }

    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(&id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::schema::{Presence, Role, UserId};

    fn fresh() -> Match {
        Match::open(MatchId::new(), "abc".into(), None, UserId(Uuid::new_v4()), Role::SideA, Utc::now())
    }

    #[test]
    fn stale_copies_are_discarded() {
        let mut cache = MatchCache::new();
        let old = fresh();
        let mut newer = old.clone();
        newer.side_a.presence = Presence::Joined;
        newer.touch(old.updated_at + Duration::seconds(1));

        assert!(cache.apply(newer.clone()));
        assert!(!cache.apply(old));
        assert!(!cache.apply(newer.clone()));
        assert_eq!(cache.get(newer.id), Some(&newer));
    }

    #[test]
    fn lobby_batches_update_each_match() {
        let mut cache = MatchCache::new();
        let a = fresh();
        let b = fresh();
        cache.apply(a.clone());

        let changed = cache.apply_event(&ServerMessage::lobby_matches_changed(vec![a, b]));

        assert_eq!(changed, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn match_changed_events_apply() {
        let mut cache = MatchCache::new();
        let m = fresh();
        assert_eq!(cache.apply_event(&ServerMessage::match_changed(&m)), 1);
        assert_eq!(cache.apply_event(&ServerMessage::match_changed(&m)), 0);
        assert!(!cache.is_empty());
    }
}
