mod engine;
mod hierarchy;
mod params;
mod policy;
mod scoring;
mod types;

pub use engine::{adjust_allocation, adjust_allocation_from, plan_all};
pub use hierarchy::enforce_hierarchy;
pub use params::{
    AssetParams, GoldPolicy, PolicyConfig, ScalingTier, asset_params, base_mix, params_for,
};
pub use policy::{CapSet, cap_set, classify_stage, risk_budget};
pub use scoring::{composite_risk, expected_yield};
pub use types::{
    ASSET_COUNT, AdjustmentWarning, AllocationOutcome, AssetClass, Metrics, Mix, MixEntry,
    PassRounds, PlanResult, Profile, RiskPreference, Stage, WarningTag,
};
