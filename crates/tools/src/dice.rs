//! Dice tools — the narrator's source of chance.
//!
//! `roll_d6` is the core mechanic: a single d6 where 5 or 6 is a success.
//! `roll_dice` is the generalized roller for worlds that need other dice.
//!
//! Both draw from an injectable RNG so tests can pin outcomes with a seed;
//! the default constructors seed from OS entropy, so every invocation is a
//! fresh draw.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;
use veilwright_core::error::ToolError;
use veilwright_core::tool::Tool;

/// The success threshold for a d6: 5 or 6.
const D6_SUCCESS: u32 = 5;

fn locked_roll(rng: &Mutex<StdRng>, sides: u32) -> Result<u32, ToolError> {
    let mut rng = rng.lock().map_err(|_| ToolError::ExecutionFailed {
        tool_name: "dice".into(),
        reason: "RNG lock poisoned".into(),
    })?;
    Ok(rng.gen_range(1..=sides))
}

/// Roll a single d6. Returns `{die: 6, value, success: value >= 5}`.
pub struct RollD6Tool {
    rng: Mutex<StdRng>,
}

impl RollD6Tool {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RollD6Tool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RollD6Tool {
    fn name(&self) -> &str {
        "roll_d6"
    }

    fn description(&self) -> &str {
        "Roll a d6 and return the face value and whether it is a success (5 or 6)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let value = locked_roll(&self.rng, 6)?;
        let success = value >= D6_SUCCESS;
        debug!(value, success, "roll_d6");
        Ok(serde_json::json!({
            "die": 6,
            "value": value,
            "success": success,
        }))
    }
}

/// Roll `count` dice with `sides` faces each.
///
/// For d6 rolls the per-die success rule applies and a success count is
/// included; other die sizes report values only.
pub struct RollDiceTool {
    rng: Mutex<StdRng>,
}

impl RollDiceTool {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RollDiceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RollDiceTool {
    fn name(&self) -> &str {
        "roll_dice"
    }

    fn description(&self) -> &str {
        "Roll one or more dice. Defaults to a single d6; sides may be 2-1000 and count 1-100."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sides": {
                    "type": "integer",
                    "description": "Number of faces per die (default 6)"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of dice to roll (default 1)"
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let sides = arguments["sides"].as_u64().unwrap_or(6);
        let count = arguments["count"].as_u64().unwrap_or(1);

        if !(2..=1000).contains(&sides) {
            return Err(ToolError::InvalidArguments(format!(
                "sides must be between 2 and 1000, got {sides}"
            )));
        }
        if !(1..=100).contains(&count) {
            return Err(ToolError::InvalidArguments(format!(
                "count must be between 1 and 100, got {count}"
            )));
        }

        let mut rolls = Vec::with_capacity(count as usize);
        for _ in 0..count {
            rolls.push(locked_roll(&self.rng, sides as u32)?);
        }
        let total: u32 = rolls.iter().sum();
        debug!(sides, count, total, "roll_dice");

        let mut result = serde_json::json!({
            "sides": sides,
            "rolls": rolls,
            "total": total,
        });
        if sides == 6 {
            let successes = rolls.iter().filter(|&&v| v >= D6_SUCCESS).count();
            result["successes"] = serde_json::json!(successes);
        }
        Ok(result)
    }
}
