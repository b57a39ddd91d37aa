use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query_as, Pool, Postgres};

use crate::error::StoreError;
use crate::model::MatchModel;
use crate::schema::{ConnectionId, Match, MatchId};
use crate::store::{ListQuery, MatchStore};

/// Postgres-backed store. The conditional transform locks the row with
/// `SELECT ... FOR UPDATE`, so concurrent writers to one match queue up
/// behind each other while different matches never contend.
#[derive(Clone)]
pub struct PgMatchStore {
    db: Pool<Postgres>,
}

impl PgMatchStore {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn read(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        let row: Option<MatchModel> = query_as(r#"SELECT * FROM matches WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(Match::try_from).transpose()
    }

    async fn read_by_connection(&self, connection: ConnectionId) -> Result<Vec<Match>, StoreError> {
        let rows: Vec<MatchModel> = query_as(
            r#"
            SELECT * FROM matches
            WHERE side_a_connection = $1 OR side_b_connection = $1
            "#,
        )
        .bind(connection)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Match::try_from).collect()
    }

    async fn conditional_transform(
        &self,
        id: MatchId,
        predicate: &(dyn for<'m> Fn(&'m Match) -> bool + Send + Sync),
        transform: &(dyn for<'m> Fn(&'m mut Match) + Send + Sync),
    ) -> Result<Option<Match>, StoreError> {
        let mut tx = self.db.begin().await?;

        let row: Option<MatchModel> = query_as(r#"SELECT * FROM matches WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut next = Match::try_from(row)?;
        if !predicate(&next) {
            tx.rollback().await?;
            return Ok(None);
        }
        transform(&mut next);
        next.touch(Utc::now());

        let row = MatchModel::try_from(&next)?;
        let saved: MatchModel = query_as(
            r#"
            UPDATE matches SET
                side_a_connection = $2, side_a_presence = $3, side_a_moves = $4,
                side_b_player = $5, side_b_connection = $6, side_b_presence = $7, side_b_moves = $8,
                next_turn = $9, outcome = $10, updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.side_a_connection)
        .bind(row.side_a_presence)
        .bind(row.side_a_moves)
        .bind(row.side_b_player)
        .bind(row.side_b_connection)
        .bind(row.side_b_presence)
        .bind(row.side_b_moves)
        .bind(row.next_turn)
        .bind(row.outcome)
        .bind(row.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Match::try_from(saved).map(Some)
    }

    async fn insert(&self, m: Match) -> Result<Match, StoreError> {
        let row = MatchModel::try_from(&m)?;
        let saved: MatchModel = query_as(
            r#"
            INSERT INTO matches (
                id, name, secret_hash, secret_salt,
                side_a_player, side_a_connection, side_a_presence, side_a_moves,
                side_b_player, side_b_connection, side_b_presence, side_b_moves,
                next_turn, outcome, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.name)
        .bind(row.secret_hash)
        .bind(row.secret_salt)
        .bind(row.side_a_player)
        .bind(row.side_a_connection)
        .bind(row.side_a_presence)
        .bind(row.side_a_moves)
        .bind(row.side_b_player)
        .bind(row.side_b_connection)
        .bind(row.side_b_presence)
        .bind(row.side_b_moves)
        .bind(row.next_turn)
        .bind(row.outcome)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.db)
        .await?;

        Match::try_from(saved)
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<Match>, StoreError> {
        let rows: Vec<MatchModel> = query_as(
            r#"
            SELECT * FROM matches
            WHERE (
                side_b_player IS NULL
                OR ($1::uuid IS NOT NULL AND outcome = 'going'
                    AND (side_a_player = $1 OR side_b_player = $1))
            )
            AND ($2::uuid IS NULL OR id > $2)
            AND ($3::uuid IS NULL OR id < $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(query.viewer)
        .bind(query.after)
        .bind(query.before)
        .bind(query.limit as i64)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Match::try_from).collect()
    }
}
