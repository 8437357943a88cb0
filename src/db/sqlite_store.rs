use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db::models::{PickRow, PICK_COLUMNS};
use crate::error::Result;
use crate::state::clock::PickClock;
use crate::state::pick_store::{no_current_pick, pick_not_found, requires_id, PickStore};
use crate::types::{BetResult, FeedMode, NewPick, Pick};

/// Durable pick store on SQLite. Multi-statement operations run in one
/// transaction, so a failed call rolls back to the prior state.
pub struct SqlitePickStore {
    pool: SqlitePool,
    mode: FeedMode,
    clock: PickClock,
}

impl SqlitePickStore {
    pub async fn connect(db_path: &str, mode: FeedMode) -> Result<Arc<Self>> {
        let pool = SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
        Self::with_pool(pool, mode).await
    }

    /// Applies migrations and resumes the id clock after the newest stored pick.
    pub async fn with_pool(pool: SqlitePool, mode: FeedMode) -> Result<Arc<Self>> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        let newest: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM picks")
            .fetch_one(&pool)
            .await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM picks").fetch_one(&pool).await?;
        info!(picks = count, "SQLite pick store ready");

        Ok(Arc::new(Self {
            pool,
            mode,
            clock: PickClock::starting_after(newest.unwrap_or(0)),
        }))
    }

    fn current_only(&self) -> bool {
        self.mode == FeedMode::Singleton
    }
}

async fn insert_pick(conn: &mut SqliteConnection, pick: &Pick) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO picks (
            id, title, bet_type, odds, matchup, game_time, sport, result,
            slip_image, description, posted_at, created_at, units
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&pick.id)
    .bind(&pick.title)
    .bind(pick.bet_type.map(|b| b.as_str()))
    .bind(&pick.odds)
    .bind(&pick.matchup)
    .bind(&pick.time)
    .bind(pick.sport.map(|s| s.as_str()))
    .bind(pick.result.to_string())
    .bind(&pick.slip_image)
    .bind(&pick.description)
    .bind(&pick.posted_at)
    .bind(pick.created_at)
    .bind(pick.units)
    .execute(conn)
    .await?;
    Ok(())
}

async fn newest_pick(conn: &mut SqliteConnection) -> Result<Option<Pick>> {
    let sql = format!("SELECT {PICK_COLUMNS} FROM picks ORDER BY created_at DESC LIMIT 1");
    let row: Option<PickRow> = sqlx::query_as(&sql).fetch_optional(conn).await?;
    row.map(Pick::try_from).transpose()
}

async fn pick_by_id(conn: &mut SqliteConnection, id: &str) -> Result<Option<Pick>> {
    let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE id = ?");
    let row: Option<PickRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;
    row.map(Pick::try_from).transpose()
}

#[async_trait]
impl PickStore for SqlitePickStore {
    fn mode(&self) -> FeedMode {
        self.mode
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self, new: NewPick) -> Result<Pick> {
        let mut tx = self.pool.begin().await?;
        if self.current_only() {
            // Takes SQLite's write lock before stamping, so the last
            // committed replace carries the newest created_at.
            sqlx::query("DELETE FROM picks").execute(&mut *tx).await?;
        }
        let (id, created_at, posted_at) = self.clock.stamp();
        let pick = new.into_pick(id, created_at, posted_at);
        insert_pick(&mut tx, &pick).await?;
        tx.commit().await?;
        Ok(pick)
    }

    async fn list(&self) -> Result<Vec<Pick>> {
        let limit = if self.current_only() { " LIMIT 1" } else { "" };
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks ORDER BY created_at DESC{limit}");
        let rows: Vec<PickRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Pick::try_from).collect()
    }

    async fn patch_result(&self, id: &str, result: BetResult) -> Result<Pick> {
        let mut tx = self.pool.begin().await?;
        let target = if self.current_only() {
            newest_pick(&mut tx).await?.filter(|p| p.id == id)
        } else {
            pick_by_id(&mut tx, id).await?
        };
        let Some(mut pick) = target else {
            return Err(pick_not_found(id));
        };

        sqlx::query("UPDATE picks SET result = ? WHERE id = ?")
            .bind(result.to_string())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        pick.result = result;
        Ok(pick)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if self.current_only() && newest_pick(&mut tx).await?.map_or(true, |p| p.id != id) {
            return Err(pick_not_found(id));
        }
        let done = sqlx::query("DELETE FROM picks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            return Err(pick_not_found(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_current(&self) -> Result<Pick> {
        if !self.current_only() {
            return Err(requires_id());
        }
        let mut tx = self.pool.begin().await?;
        let current = newest_pick(&mut tx).await?.ok_or_else(no_current_pick)?;
        sqlx::query("DELETE FROM picks").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(current)
    }
}
