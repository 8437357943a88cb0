//! Row type for the `picks` table (migrations/0001_create_picks.sql).

use crate::error::AppError;
use crate::types::{BetResult, BetType, Pick, Sport};

pub const PICK_COLUMNS: &str = "id, title, bet_type, odds, matchup, game_time, sport, result, \
                                slip_image, description, posted_at, created_at, units";

#[derive(Debug, sqlx::FromRow)]
pub struct PickRow {
    pub id: String,
    pub title: String,
    pub bet_type: Option<String>,
    pub odds: Option<String>,
    pub matchup: Option<String>,
    pub game_time: String,
    pub sport: Option<String>,
    pub result: String,
    pub slip_image: Option<String>,
    pub description: Option<String>,
    pub posted_at: String,
    pub created_at: i64,
    pub units: Option<f64>,
}

fn decode_err(column: &str, e: String) -> AppError {
    AppError::Database(sqlx::Error::Decode(format!("picks.{column}: {e}").into()))
}

impl TryFrom<PickRow> for Pick {
    type Error = AppError;

    fn try_from(row: PickRow) -> Result<Self, Self::Error> {
        let bet_type = row
            .bet_type
            .map(|b| b.parse::<BetType>())
            .transpose()
            .map_err(|e| decode_err("bet_type", e))?;
        let sport = row
            .sport
            .map(|s| s.parse::<Sport>())
            .transpose()
            .map_err(|e| decode_err("sport", e))?;
        let result = row.result.parse::<BetResult>().map_err(|e| decode_err("result", e))?;

        Ok(Pick {
            id: row.id,
            title: row.title,
            bet_type,
            odds: row.odds,
            matchup: row.matchup,
            time: row.game_time,
            sport,
            result,
            slip_image: row.slip_image,
            description: row.description,
            posted_at: row.posted_at,
            created_at: row.created_at,
            units: row.units,
        })
    }
}
