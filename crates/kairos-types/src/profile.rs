use serde::{Deserialize, Serialize};

/// Weights applied to the scorer's factors. All default to the values
/// seeded by the first migration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorWeights {
    pub deadline_pressure: f64,
    pub behind_pace: f64,
    pub spacing: f64,
    pub variation: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            deadline_pressure: 1.0,
            behind_pace: 0.8,
            spacing: 0.6,
            variation: 0.5,
        }
    }
}

/// Singleton user profile (`id = "default"`), seeded on first migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Safety margin applied to remaining work when computing risk.
    pub buffer_pct: f64,
    #[serde(flatten)]
    pub weights: FactorWeights,
    pub default_max_slices: i64,
    pub baseline_daily_min: i64,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            buffer_pct: 0.1,
            weights: FactorWeights::default(),
            default_max_slices: 5,
            baseline_daily_min: 60,
        }
    }
}
