use super::state::WorkflowState;
use crate::kitchen::KitchenSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Final aggregate state of a completed brew.
#[derive(Debug, Clone, Serialize)]
pub struct BrewReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 1 when the first assembly attempt succeeded, 2 after a retry
    pub assembly_attempts: u32,
    /// Every state the coordinator passed through, in order
    pub history: Vec<WorkflowState>,
    /// Kitchen right after the durable supplies were gathered
    pub after_durables: KitchenSnapshot,
    /// Kitchen right after the bench was reset, if an attempt was cancelled
    pub after_reset: Option<KitchenSnapshot>,
    pub final_state: KitchenSnapshot,
}

impl BrewReport {
    pub fn summary(&self) -> String {
        let bench = &self.final_state.bench;
        format!(
            "Final state => WaterBoiled:{}, Cup:{}, Spoon:{}, TeaBagInCup:{}, SugarInCup:{}, MilkPoured:{}, Stirs:{}",
            self.final_state.kettle == crate::kitchen::HeatingState::Boiled,
            bench.cup,
            bench.spoon,
            bench.tea_bag,
            bench.sugar,
            bench.milk_poured,
            bench.stirs
        )
    }
}
