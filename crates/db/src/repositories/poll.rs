use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::debug;

use pollbot_core::domain::poll::{Poll, PollId, PollSettings};
use pollbot_core::errors::{PollError, StoreError};
use pollbot_core::store::{PollMutation, PollStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlPollStore {
    pool: DbPool,
}

impl SqlPollStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

fn to_index(name: &str, value: i64) -> Result<usize, RepositoryError> {
    usize::try_from(value).map_err(|_| RepositoryError::Decode(format!("{name}: {value}")))
}

fn row_to_poll(
    row: &SqliteRow,
    options: Vec<String>,
    voters: BTreeMap<String, Vec<usize>>,
) -> Result<Poll, RepositoryError> {
    let max_votes: i64 = column(row, "max_votes")?;
    let max_votes = u32::try_from(max_votes)
        .map_err(|_| RepositoryError::Decode(format!("max_votes: {max_votes}")))?;
    let created_at: String = column(row, "created_at")?;
    let closed_at: Option<String> = column(row, "closed_at")?;

    Ok(Poll {
        id: PollId(column(row, "id")?),
        message: column(row, "message")?,
        options,
        settings: PollSettings {
            max_votes,
            show_progress: column(row, "show_progress")?,
            public_voters: column(row, "public_voters")?,
        },
        creator: column(row, "creator_id")?,
        voters,
        closed: column(row, "closed")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        closed_at: closed_at.as_deref().map(|value| parse_timestamp("closed_at", value)).transpose()?,
    })
}

async fn load_poll(
    conn: &mut SqliteConnection,
    id: &PollId,
) -> Result<Option<Poll>, RepositoryError> {
    let Some(row) = sqlx::query(
        "SELECT id, message, creator_id, max_votes, show_progress, public_voters,
                closed, created_at, closed_at
         FROM poll WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let options: Vec<String> =
        sqlx::query_scalar("SELECT label FROM poll_option WHERE poll_id = ? ORDER BY position ASC")
            .bind(&id.0)
            .fetch_all(&mut *conn)
            .await?;

    let vote_rows = sqlx::query(
        "SELECT voter_id, option_position FROM poll_vote
         WHERE poll_id = ? ORDER BY voter_id ASC, selection_order ASC",
    )
    .bind(&id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut voters: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for vote in &vote_rows {
        let voter: String = column(vote, "voter_id")?;
        let position = to_index("option_position", column(vote, "option_position")?)?;
        voters.entry(voter).or_default().push(position);
    }

    let poll = row_to_poll(&row, options, voters)?;
    poll.check_consistency().map_err(RepositoryError::Decode)?;
    Ok(Some(poll))
}

async fn replace_votes(conn: &mut SqliteConnection, poll: &Poll) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM poll_vote WHERE poll_id = ?")
        .bind(&poll.id.0)
        .execute(&mut *conn)
        .await?;

    for (voter, selection) in &poll.voters {
        for (order, option) in selection.iter().enumerate() {
            sqlx::query(
                "INSERT INTO poll_vote (poll_id, voter_id, option_position, selection_order)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&poll.id.0)
            .bind(voter)
            .bind(*option as i64)
            .bind(order as i64)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

#[async_trait::async_trait]
impl PollStore for SqlPollStore {
    async fn insert(&self, poll: Poll) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let created_at = poll.created_at.to_rfc3339();

        sqlx::query(
            "INSERT INTO poll (id, message, creator_id, max_votes, show_progress, public_voters,
                               closed, created_at, updated_at, closed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&poll.id.0)
        .bind(&poll.message)
        .bind(&poll.creator)
        .bind(i64::from(poll.settings.max_votes))
        .bind(poll.settings.show_progress)
        .bind(poll.settings.public_voters)
        .bind(poll.closed)
        .bind(&created_at)
        .bind(&created_at)
        .bind(poll.closed_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        for (position, label) in poll.options.iter().enumerate() {
            sqlx::query("INSERT INTO poll_option (poll_id, position, label) VALUES (?, ?, ?)")
                .bind(&poll.id.0)
                .bind(position as i64)
                .bind(label)
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
        }

        replace_votes(&mut tx, &poll).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn find(&self, id: &PollId) -> Result<Option<Poll>, StoreError> {
        // one read transaction so the three selects see the same snapshot
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let poll = load_poll(&mut tx, id).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(
            event_name = "store.poll.loaded",
            poll_id = %id.0,
            found = poll.is_some(),
            "poll lookup finished"
        );
        Ok(poll)
    }

    async fn atomically(&self, id: &PollId, mutation: PollMutation<'_>) -> Result<Poll, PollError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let now = Utc::now().to_rfc3339();

        // Writing first takes the database write lock before anything is read.
        let claimed = sqlx::query("UPDATE poll SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        if claimed.rows_affected() == 0 {
            return Err(PollError::NotFound(id.clone()));
        }

        let mut poll =
            load_poll(&mut tx, id).await?.ok_or_else(|| PollError::NotFound(id.clone()))?;
        mutation(&mut poll)?;

        sqlx::query("UPDATE poll SET closed = ?, closed_at = ? WHERE id = ?")
            .bind(poll.closed)
            .bind(poll.closed_at.map(|dt| dt.to_rfc3339()))
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        replace_votes(&mut tx, &poll).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(
            event_name = "store.poll.committed",
            poll_id = %id.0,
            voters = poll.voters.len(),
            closed = poll.closed,
            "poll mutation committed"
        );
        Ok(poll)
    }
}
