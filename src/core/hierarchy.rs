use tracing::{debug, warn};

use super::params::PolicyConfig;
use super::policy::cap_set;
use super::scoring::{composite_risk, expected_yield};
use super::types::{AdjustmentWarning, AllocationOutcome, AssetClass, PlanResult, WarningTag};

/// Reconciles the three independently adjusted mixes so the ordering
/// invariants between them hold: a conservative profile never out-risks
/// or out-earns a more aggressive one. Each violation gets one small
/// targeted transfer; pathological inputs may stay violated, which is
/// logged rather than chased iteratively.
pub fn enforce_hierarchy(result: &mut PlanResult, config: &PolicyConfig) {
    let step = config.hierarchy_transfer_pct;

    if result.conservative.metrics.risk_score + 1e-9 >= result.balanced.metrics.risk_score {
        let moved = transfer(
            &mut result.conservative,
            AssetClass::Equity,
            AssetClass::Gold,
            step,
            config,
        );
        warn!(
            moved,
            "conservative risk at or above balanced; shifted equity into gold"
        );
    }

    if result.balanced.metrics.risk_score > result.growth.metrics.risk_score + 1e-9 {
        let moved = transfer(
            &mut result.balanced,
            AssetClass::Equity,
            AssetClass::Gold,
            step,
            config,
        );
        warn!(moved, "balanced risk above growth; shifted equity into gold");
    }

    // Yield ordering only binds while growth still has risk room.
    if result.balanced.metrics.expected_yield_annual
        > result.growth.metrics.expected_yield_annual + 1e-9
        && result.growth.metrics.risk_score < result.growth.metrics.risk_budget
    {
        let moved = transfer(
            &mut result.growth,
            AssetClass::Gold,
            AssetClass::Equity,
            step,
            config,
        );
        warn!(
            moved,
            "balanced yield above growth; shifted growth gold into equity"
        );
    }

    let crypto_gap = result.balanced.mix.weight(AssetClass::Crypto)
        - result.growth.mix.weight(AssetClass::Crypto);
    if crypto_gap > 1e-9 {
        let moved = transfer(
            &mut result.balanced,
            AssetClass::Crypto,
            AssetClass::Equity,
            crypto_gap.min(step),
            config,
        );
        warn!(
            moved,
            "balanced crypto above growth; shifted balanced crypto into equity"
        );
    }

    let cash_gap =
        result.growth.mix.weight(AssetClass::Cash) - result.balanced.mix.weight(AssetClass::Cash);
    if cash_gap > 1e-9 {
        let moved = transfer(
            &mut result.growth,
            AssetClass::Cash,
            AssetClass::CorpBonds,
            cash_gap.min(step),
            config,
        );
        warn!(
            moved,
            "growth cash above balanced; shifted growth cash into corporate bonds"
        );
    }

    if result.conservative.metrics.risk_score + 1e-9 >= result.balanced.metrics.risk_score {
        warn!("risk ordering between conservative and balanced remains violated");
    } else {
        debug!("cross-profile hierarchy satisfied");
    }
}

/// Moves up to `amount` percentage points, bounded by the source weight
/// and the destination's cap room (gold additionally by its hard cap),
/// then refreshes the outcome's metrics.
fn transfer(
    outcome: &mut AllocationOutcome,
    from: AssetClass,
    to: AssetClass,
    amount: f64,
    config: &PolicyConfig,
) -> f64 {
    let caps = cap_set(outcome.preference, outcome.stage, config);
    let available = outcome.mix.weight(from);
    let mut room = caps.room(to, &outcome.mix);
    if to == AssetClass::Gold {
        let hard_room = (config.gold_policy(outcome.preference).hard_cap
            - outcome.mix.weight(AssetClass::Gold))
        .max(0.0);
        room = room.min(hard_room);
    }

    let moved = amount.min(available).min(room);
    if moved <= 1e-9 {
        return 0.0;
    }

    outcome.mix.add_weight(from, -moved);
    outcome.mix.add_weight(to, moved);
    outcome.mix.normalize();
    outcome.metrics.risk_score = composite_risk(&outcome.mix, outcome.preference, config);
    outcome.metrics.expected_yield_annual = expected_yield(&outcome.mix, outcome.preference);

    if !outcome
        .warnings
        .iter()
        .any(|w| w.tag == WarningTag::HierarchyAdjusted)
    {
        outcome.warnings.push(AdjustmentWarning {
            tag: WarningTag::HierarchyAdjusted,
            context: Some(moved),
        });
    }
    moved
}
