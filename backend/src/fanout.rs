use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::protocol::ServerMessage;
use crate::schema::{ConnectionId, Match, MatchId};

pub type Outbox = UnboundedSender<ServerMessage>;

/// Address of a subscriber group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn for_match(id: MatchId) -> Self {
        GroupKey(format!("match_{id}"))
    }

    pub fn lobby() -> Self {
        GroupKey("matches".to_string())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live connections and the groups they subscribed to.
#[derive(Default)]
pub struct Groups {
    outboxes: DashMap<ConnectionId, Outbox>,
    members: DashMap<GroupKey, HashSet<ConnectionId>>,
}

impl Groups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection, outbox);
    }

    /// Forgets the connection and drops it from every group.
    pub fn unregister(&self, connection: ConnectionId) {
        self.outboxes.remove(&connection);
        self.members.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    pub fn join(&self, group: GroupKey, connection: ConnectionId) {
        self.members.entry(group).or_default().insert(connection);
    }

    pub fn leave(&self, group: &GroupKey, connection: ConnectionId) {
        self.members.remove_if_mut(group, |_, members| {
            members.remove(&connection);
            members.is_empty()
        });
    }

    pub fn is_member(&self, group: &GroupKey, connection: ConnectionId) -> bool {
        self.members
            .get(group)
            .is_some_and(|members| members.contains(&connection))
    }

    /// Queues `message` for every member of `group` and returns how many
    /// outboxes accepted it. Never waits on a socket.
    pub fn publish(&self, group: &GroupKey, message: &ServerMessage) -> usize {
        let recipients: Vec<ConnectionId> = match self.members.get(group) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };
        recipients
            .into_iter()
            .filter(|connection| {
                self.outboxes
                    .get(connection)
                    .is_some_and(|outbox| outbox.send(message.clone()).is_ok())
            })
            .count()
    }
}

/// Pushes committed match changes out to the match and lobby groups.
#[derive(Clone)]
pub struct NotificationFanout {
    groups: Arc<Groups>,
}

impl NotificationFanout {
    pub fn new(groups: Arc<Groups>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// One transition committed: tell the room and the lobby.
    pub fn match_changed(&self, m: &Match) {
        let room = GroupKey::for_match(m.id);
        let in_room = self.groups.publish(&room, &ServerMessage::match_changed(m));
        let in_lobby = self
            .groups
            .publish(&GroupKey::lobby(), &ServerMessage::lobby_matches_changed(vec![m.clone()]));
        tracing::debug!(match_id = %m.id, in_room, in_lobby, "published match change");
    }

    /// A batch of changes that the lobby should see at once, e.g. everything
    /// released by one disconnect or a newly created match.
    pub fn lobby_changed(&self, matches: Vec<Match>) {
        if matches.is_empty() {
            return;
        }
        let in_lobby = self
            .groups
            .publish(&GroupKey::lobby(), &ServerMessage::lobby_matches_changed(matches));
        tracing::debug!(in_lobby, "published lobby change");
    }

    /// Room-only notification, used when the lobby gets the change batched
    /// separately.
    pub fn room_changed(&self, m: &Match) {
        self.groups
            .publish(&GroupKey::for_match(m.id), &ServerMessage::match_changed(m));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;

    use super::*;
    use crate::schema::{Role, UserId};

    fn connect(groups: &Groups) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::new();
        groups.register(connection, tx);
        (connection, rx)
    }

    fn fresh() -> Match {
        Match::open(MatchId::new(), "abc".into(), None, UserId(Uuid::new_v4()), Role::SideA, Utc::now())
    }

    #[test]
    fn group_keys_are_deterministic() {
        let id = MatchId(Uuid::nil());
        assert_eq!(
            GroupKey::for_match(id).to_string(),
            "match_00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(GroupKey::for_match(id), GroupKey::for_match(id));
        assert_eq!(GroupKey::lobby().to_string(), "matches");
    }

    #[test]
    fn match_change_reaches_room_and_lobby() {
        let groups = Arc::new(Groups::new());
        let fanout = NotificationFanout::new(groups.clone());
        let m = fresh();
        let (player, mut player_rx) = connect(&groups);
        let (browser, mut browser_rx) = connect(&groups);
        let (_idle, mut idle_rx) = connect(&groups);
        groups.join(GroupKey::for_match(m.id), player);
        groups.join(GroupKey::lobby(), browser);

        fanout.match_changed(&m);

        assert_eq!(player_rx.try_recv().unwrap(), ServerMessage::match_changed(&m));
        assert_eq!(
            browser_rx.try_recv().unwrap(),
            ServerMessage::lobby_matches_changed(vec![m.clone()])
        );
        assert!(idle_rx.try_recv().is_err());
    }

    #[test]
    fn lobby_batch_is_one_event() {
        let groups = Arc::new(Groups::new());
        let fanout = NotificationFanout::new(groups.clone());
        let (browser, mut rx) = connect(&groups);
        groups.join(GroupKey::lobby(), browser);
        let batch = vec![fresh(), fresh()];

        fanout.lobby_changed(batch.clone());
        fanout.lobby_changed(vec![]);

        assert_eq!(rx.try_recv().unwrap(), ServerMessage::lobby_matches_changed(batch));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unregister_removes_connection_everywhere() {
        let groups = Groups::new();
        let (connection, _rx) = connect(&groups);
        let room = GroupKey::for_match(MatchId::new());
        groups.join(room.clone(), connection);
        groups.join(GroupKey::lobby(), connection);

        groups.unregister(connection);

        assert!(!groups.is_member(&room, connection));
        assert!(!groups.is_member(&GroupKey::lobby(), connection));
        assert_eq!(groups.publish(&room, &ServerMessage::lobby_matches_changed(vec![])), 0);
    }

    #[test]
    fn leave_only_affects_one_group() {
        let groups = Groups::new();
        let (connection, _rx) = connect(&groups);
        let room = GroupKey::for_match(MatchId::new());
        groups.join(room.clone(), connection);
        groups.join(GroupKey::lobby(), connection);

        groups.leave(&room, connection);

        assert!(!groups.is_member(&room, connection));
        assert!(groups.is_member(&GroupKey::lobby(), connection));
    }

    #[test]
    fn closed_outboxes_are_skipped() {
        let groups = Groups::new();
        let (gone, rx) = connect(&groups);
        let (alive, _alive_rx) = connect(&groups);
        drop(rx);
        groups.join(GroupKey::lobby(), gone);
        groups.join(GroupKey::lobby(), alive);

        let delivered = groups.publish(&GroupKey::lobby(), &ServerMessage::lobby_matches_changed(vec![]));
        assert_eq!(delivered, 1);
    }
}
