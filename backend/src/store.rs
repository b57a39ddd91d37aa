use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::schema::{ConnectionId, Match, MatchId, Outcome, UserId};

/// Which matches a lobby page may show and where the page starts.
#[derive(Clone, Copy, Debug)]
pub struct ListQuery {
    /// Viewer whose own unfinished matches are listed beside open ones.
    pub viewer: Option<UserId>,
    /// Only ids newer than this one.
    pub after: Option<MatchId>,
    /// Only ids older than this one.
    pub before: Option<MatchId>,
    pub limit: usize,
}

impl ListQuery {
    pub fn admits(&self, m: &Match) -> bool {
        let visible = m.side_b.player_id.is_none()
            || self.viewer.is_some_and(|viewer| {
                m.outcome == Outcome::Going && m.role_of(viewer).is_some()
            });
        visible
            && self.after.map_or(true, |after| m.id > after)
            && self.before.map_or(true, |before| m.id < before)
    }
}

/// Persistence seam for match documents.
///
/// `conditional_transform` is the only way a stored match changes. The
/// predicate and the transform see the very snapshot the write commits
/// against; when the predicate fails, or the document does not exist, the
/// call returns `Ok(None)` and leaves the document untouched. Callers treat
/// that as a business decision and never retry. Implementations stamp
/// `updated_at` through [`Match::touch`] on every committed transform.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn read(&self, id: MatchId) -> Result<Option<Match>, StoreError>;

    async fn read_by_connection(&self, connection: ConnectionId) -> Result<Vec<Match>, StoreError>;

    async fn conditional_transform(
        &self,
        id: MatchId,
        predicate: &(dyn for<'m> Fn(&'m Match) -> bool + Send + Sync),
        transform: &(dyn for<'m> Fn(&'m mut Match) + Send + Sync),
    ) -> Result<Option<Match>, StoreError>;

    async fn insert(&self, m: Match) -> Result<Match, StoreError>;

    /// Newest first by creation time.
    async fn list(&self, query: ListQuery) -> Result<Vec<Match>, StoreError>;
}

/// Process-local store. Each document sits behind its DashMap shard lock,
/// which is held from predicate evaluation through the write.
#[derive(Default)]
pub struct MemoryMatchStore {
    matches: DashMap<MatchId, Match>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn read(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.matches.get(&id).map(|m| m.value().clone()))
    }

    async fn read_by_connection(&self, connection: ConnectionId) -> Result<Vec<Match>, StoreError> {
        Ok(self
            .matches
            .iter()
            .filter(|m| m.side_a.is_bound_to(connection) || m.side_b.is_bound_to(connection))
            .map(|m| m.value().clone())
            .collect())
    }

    async fn conditional_transform(
        &self,
        id: MatchId,
        predicate: &(dyn for<'m> Fn(&'m Match) -> bool + Send + Sync),
        transform: &(dyn for<'m> Fn(&'m mut Match) + Send + Sync),
    ) -> Result<Option<Match>, StoreError> {
        let Some(mut current) = self.matches.get_mut(&id) else {
            return Ok(None);
        };
        if !predicate(&*current) {
            return Ok(None);
        }
        // Work on a copy so a transform never leaves a half-written document.
        let mut next = (*current).clone();
        transform(&mut next);
        next.touch(Utc::now());
        *current = next.clone();
        Ok(Some(next))
    }

    async fn insert(&self, m: Match) -> Result<Match, StoreError> {
        self.matches.insert(m.id, m.clone());
        Ok(m)
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<Match>, StoreError> {
        let mut page: Vec<Match> = self
            .matches
            .iter()
            .filter(|m| query.admits(m))
            .map(|m| m.value().clone())
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        page.truncate(query.limit);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::schema::{Presence, Role};

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn fresh(creator: UserId) -> Match {
        Match::open(MatchId::new(), "abc".into(), None, creator, Role::SideA, Utc::now())
    }

    #[tokio::test]
    async fn transform_applies_when_predicate_holds() {
        let store = MemoryMatchStore::new();
        let m = store.insert(fresh(user())).await.unwrap();
        let conn = ConnectionId::new();

        let updated = store
            .conditional_transform(m.id, &|m: &Match| m.side_a.presence == Presence::Left, &|m: &mut Match| {
                m.side_a.presence = Presence::Joined;
                m.side_a.connection_id = Some(conn);
            })
            .await
            .unwrap()
            .expect("predicate holds");

        assert_eq!(updated.side_a.presence, Presence::Joined);
        assert!(updated.updated_at > m.updated_at);
        assert_eq!(store.read(m.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn closures_may_borrow_caller_locals() {
        let store = MemoryMatchStore::new();
        let m = store.insert(fresh(user())).await.unwrap();
        let wanted = String::from("abc");
        let renamed = format!("{wanted}-2");

        let updated = store
            .conditional_transform(
                m.id,
                &|current: &Match| current.name == wanted,
                &|next: &mut Match| next.name.clone_from(&renamed),
            )
            .await
            .unwrap()
            .expect("name matched");

        assert_eq!(updated.name, "abc-2");
        assert_eq!(wanted, "abc");
    }

    #[tokio::test]
    async fn failed_predicate_leaves_document_untouched() {
        let store = MemoryMatchStore::new();
        let m = store.insert(fresh(user())).await.unwrap();

        let result = store
            .conditional_transform(m.id, &|_: &Match| false, &|m: &mut Match| m.name = "changed".into())
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(store.read(m.id).await.unwrap(), Some(m));
    }

    #[tokio::test]
    async fn missing_document_is_not_an_error() {
        let store = MemoryMatchStore::new();
        let result = store
            .conditional_transform(MatchId::new(), &|_: &Match| true, &|_: &mut Match| {})
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn read_by_connection_checks_both_sides() {
        let store = MemoryMatchStore::new();
        let conn = ConnectionId::new();
        let mut a = fresh(user());
        a.side_a.connection_id = Some(conn);
        let mut b = fresh(user());
        b.side_b.connection_id = Some(conn);
        let c = fresh(user());
        for m in [a.clone(), b.clone(), c] {
            store.insert(m).await.unwrap();
        }

        let mut found: Vec<MatchId> = store
            .read_by_connection(conn)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        found.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn list_shows_open_and_own_unfinished_matches() {
        let store = MemoryMatchStore::new();
        let viewer = user();
        let now = Utc::now();

        let open = fresh(user());
        let mut mine = fresh(viewer);
        mine.side_b.player_id = Some(user());
        mine.created_at = now + Duration::seconds(1);
        let mut mine_finished = fresh(viewer);
        mine_finished.side_b.player_id = Some(user());
        mine_finished.outcome = Outcome::Draw;
        let mut others = fresh(user());
        others.side_b.player_id = Some(user());
        for m in [open.clone(), mine.clone(), mine_finished, others] {
            store.insert(m).await.unwrap();
        }

        let page = store
            .list(ListQuery {
                viewer: Some(viewer),
                after: None,
                before: None,
                limit: 10,
            })
            .await
            .unwrap();
        let ids: Vec<MatchId> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![mine.id, open.id]);

        let anonymous = store
            .list(ListQuery {
                viewer: None,
                after: None,
                before: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 1);
    }

    #[tokio::test]
    async fn list_honours_cursors_and_limit() {
        let store = MemoryMatchStore::new();
        let base = Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut m = fresh(user());
            m.id = MatchId(Uuid::from_u128(100 + i as u128));
            m.created_at = base + Duration::milliseconds(i);
            ids.push(store.insert(m).await.unwrap().id);
        }
        let query = |after, before, limit| ListQuery {
            viewer: None,
            after,
            before,
            limit,
        };

        let newest: Vec<MatchId> = store.list(query(None, None, 2)).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(newest, vec![ids[4], ids[3]]);

        let older: Vec<MatchId> = store
            .list(query(None, Some(ids[3]), 10))
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(older, vec![ids[2], ids[1], ids[0]]);

        let newer: Vec<MatchId> = store
            .list(query(Some(ids[2]), None, 10))
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(newer, vec![ids[4], ids[3]]);
    }
}
