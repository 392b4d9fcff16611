//! Importance scoring: initial value, time decay, and recency.
//!
//! Pure functions; persistence of any score change goes through the
//! store. All outputs are clamped to [0, 1].

use crate::config::DecayConfig;
use crate::memory::types::{Memory, MemoryType};
use chrono::{DateTime, Utc};

/// Content length at which the length bonus tops out.
const LENGTH_BONUS_CAP_CHARS: f32 = 2000.0;

/// Maximum bonus added on top of the type base importance.
const LENGTH_BONUS_MAX: f32 = 0.2;

/// Initial importance for a new memory: type base value plus a small
/// bonus for substantial content.
pub fn initial_importance(memory_type: MemoryType, content_len: usize) -> f32 {
    let length_bonus =
        (content_len as f32 / LENGTH_BONUS_CAP_CHARS * LENGTH_BONUS_MAX).min(LENGTH_BONUS_MAX);
    (memory_type.base_importance() + length_bonus).clamp(0.0, 1.0)
}

/// Importance decayed exponentially with time since the last access:
/// `importance * exp(-lambda * days)`. The decay rate depends on the
/// memory type; summaries outlive raw conversation fragments.
pub fn decayed_importance(memory: &Memory, now: DateTime<Utc>, decay: &DecayConfig) -> f32 {
    let lambda = decay.decay_for(memory.memory_type);
    let decayed = memory.importance as f64 * (-lambda * days_since(memory.last_accessed_at, now)).exp();
    (decayed as f32).clamp(0.0, 1.0)
}

/// Recency factor in [0, 1] for composite ranking, decaying with time
/// since the last access.
pub fn recency_factor(memory: &Memory, now: DateTime<Utc>, decay: &DecayConfig) -> f32 {
    let factor = (-decay.recency_rate_per_day * days_since(memory.last_accessed_at, now)).exp();
    (factor as f32).clamp(0.0, 1.0)
}

/// Elapsed days, never negative. Clock skew between writer and scorer
/// must not inflate a score.
fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - then).num_seconds().max(0) as f64) / 86_400.0
}
