use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use kairos_types::{FactorWeights, UserProfile};

use crate::error::{StoreError, StoreResult};

use super::ts_to_sql;

/// Load the singleton profile. The first migration seeds it, so an
/// absent row means the store was tampered with; fall back to defaults
/// rather than failing the whole request.
pub fn get(conn: &Connection) -> StoreResult<UserProfile> {
    let profile = conn
        .query_row(
            "SELECT id, buffer_pct, w_deadline_pressure, w_behind_pace, w_spacing,
                    w_variation, default_max_slices, baseline_daily_min
             FROM user_profile WHERE id = 'default'",
            [],
            |row| {
                Ok(UserProfile {
                    id: row.get(0)?,
                    buffer_pct: row.get(1)?,
                    weights: FactorWeights {
                        deadline_pressure: row.get(2)?,
                        behind_pace: row.get(3)?,
                        spacing: row.get(4)?,
                        variation: row.get(5)?,
                    },
                    default_max_slices: row.get(6)?,
                    baseline_daily_min: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(profile.unwrap_or_default())
}

pub fn update(conn: &Connection, profile: &UserProfile) -> StoreResult<()> {
    if profile.buffer_pct < 0.0 {
        return Err(StoreError::Validation("buffer_pct must be >= 0".into()));
    }
    if profile.default_max_slices < 1 {
        return Err(StoreError::Validation(
            "default_max_slices must be >= 1".into(),
        ));
    }
    conn.execute(
        "INSERT INTO user_profile
            (id, buffer_pct, w_deadline_pressure, w_behind_pace, w_spacing,
             w_variation, default_max_slices, baseline_daily_min, updated_at)
         VALUES ('default', ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            buffer_pct = excluded.buffer_pct,
            w_deadline_pressure = excluded.w_deadline_pressure,
            w_behind_pace = excluded.w_behind_pace,
            w_spacing = excluded.w_spacing,
            w_variation = excluded.w_variation,
            default_max_slices = excluded.default_max_slices,
            baseline_daily_min = excluded.baseline_daily_min,
            updated_at = excluded.updated_at",
        params![
            profile.buffer_pct,
            profile.weights.deadline_pressure,
            profile.weights.behind_pace,
            profile.weights.spacing,
            profile.weights.variation,
            profile.default_max_slices,
            profile.baseline_daily_min,
            ts_to_sql(&Utc::now()),
        ],
    )?;
    Ok(())
}
