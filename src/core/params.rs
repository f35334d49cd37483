use super::types::{ASSET_COUNT, AssetClass, Mix, RiskPreference};

/// Expected annual return (percent) and 0-10 risk score for one asset
/// class under one risk preference. Immutable reference data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssetParams {
    pub expected_return: f64,
    pub risk_score: f64,
}

const fn p(expected_return: f64, risk_score: f64) -> AssetParams {
    AssetParams {
        expected_return,
        risk_score,
    }
}

// Rows follow AssetClass declaration order:
// equity, gold, dynamic, crypto, gov bonds, corp bonds, cash, real estate.
const CONSERVATIVE_PARAMS: [AssetParams; ASSET_COUNT] = [
    p(5.0, 5.5),
    p(3.0, 3.0),
    p(4.0, 4.5),
    p(12.0, 9.5),
    p(2.5, 1.5),
    p(3.5, 2.5),
    p(1.0, 0.5),
    p(4.5, 4.0),
];

const BALANCED_PARAMS: [AssetParams; ASSET_COUNT] = [
    p(6.5, 6.0),
    p(3.5, 3.0),
    p(5.5, 5.0),
    p(15.0, 9.5),
    p(2.8, 1.5),
    p(4.0, 2.5),
    p(1.2, 0.5),
    p(5.5, 4.5),
];

const GROWTH_PARAMS: [AssetParams; ASSET_COUNT] = [
    p(8.5, 6.5),
    p(4.0, 3.5),
    p(7.0, 5.5),
    p(20.0, 10.0),
    p(3.0, 1.5),
    p(4.5, 3.0),
    p(1.5, 0.5),
    p(6.5, 5.0),
];

pub fn asset_params(preference: RiskPreference) -> &'static [AssetParams; ASSET_COUNT] {
    match preference {
        RiskPreference::Conservative => &CONSERVATIVE_PARAMS,
        RiskPreference::Balanced => &BALANCED_PARAMS,
        RiskPreference::Growth => &GROWTH_PARAMS,
    }
}

pub fn params_for(class: AssetClass, preference: RiskPreference) -> AssetParams {
    asset_params(preference)[class.index()]
}

/// Static per-preference starting allocation. Weights sum to 100.
pub fn base_mix(preference: RiskPreference) -> Mix {
    match preference {
        RiskPreference::Conservative => {
            Mix::new([20.0, 15.0, 5.0, 0.0, 25.0, 15.0, 10.0, 10.0])
        }
        RiskPreference::Balanced => Mix::new([35.0, 10.0, 10.0, 5.0, 15.0, 10.0, 5.0, 10.0]),
        RiskPreference::Growth => Mix::new([45.0, 5.0, 15.0, 10.0, 5.0, 5.0, 5.0, 10.0]),
    }
}

/// Gold allocation policy. Inverted relative to the other risk assets:
/// conservative profiles may hold the most gold.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GoldPolicy {
    pub target_min: f64,
    pub target_max: f64,
    pub hard_cap: f64,
}

/// Deposit tier tightening the caps of the two most volatile classes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScalingTier {
    pub threshold_eur: f64,
    pub dynamic_cap: f64,
    pub crypto_cap: f64,
}

/// Every numeric policy constant the pipeline consumes, bundled into one
/// immutable struct injected per call. Alternate policy versions are
/// plain values, swappable in tests without shared state.
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    // Stage classification.
    pub stage_early_limit_eur: f64,
    pub stage_core_limit_eur: f64,

    // Per-preference risk budgets, nudged by stage.
    pub risk_budgets: [f64; 3],
    pub stage_budget_nudge: f64,
    pub risk_tolerance: f64,

    // Per-stage-and-preference cap tables.
    pub base_caps: [[f64; ASSET_COUNT]; 3],
    pub combo_caps: [f64; 3],
    pub early_equity_relax: f64,
    pub early_dynamic_relax: f64,
    pub late_equity_tighten: f64,
    pub late_dynamic_tighten: f64,

    // Composite-risk concentration bias for dynamic + crypto.
    pub combo_bias_threshold: f64,
    pub combo_bias: f64,

    pub gold_policies: [GoldPolicy; 3],

    // Deposit scaling tiers, checked highest threshold first.
    pub lump_tiers: [ScalingTier; 3],
    pub monthly_tiers: [ScalingTier; 2],

    // Absolute EUR minimum per class; zero means no minimum.
    pub min_investment_eur: [f64; ASSET_COUNT],
    pub min_redistribution_gold_share: [f64; 3],

    // Floors.
    pub bond_floor_pct: [f64; 3],
    pub cash_floor_min_pct: f64,
    pub cash_floor_max_pct: f64,

    // Bidirectional risk tuner.
    pub tuner_step: f64,
    pub tuner_max_steps: u32,
    pub band_lower_fraction: [f64; 3],
    pub uptune_ceiling_pct: [f64; 3],
    pub real_estate_income_gate_eur: f64,
    pub real_estate_lump_gate_eur: f64,

    // Hard risk-cap enforcement.
    pub risk_cap_max_rounds: u32,
    pub direct_cut_after_round: u32,
    pub risk_cap_min_cut_pct: f64,
    pub risk_cap_cut_fraction: f64,
    pub high_risk_score: f64,

    // Yield optimizer.
    pub optimizer_margin: f64,
    pub optimizer_min_volume_eur: f64,
    pub optimizer_max_iterations: u32,
    pub optimizer_headroom: f64,
    pub optimizer_risk_ceiling: f64,
    pub yield_boost_ceiling_pct: [f64; 3],

    // Cross-profile hierarchy enforcement.
    pub hierarchy_transfer_pct: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            stage_early_limit_eur: 50_000.0,
            stage_core_limit_eur: 100_000.0,

            risk_budgets: [3.5, 5.5, 7.5],
            stage_budget_nudge: 0.5,
            risk_tolerance: 0.1,

            // Rows by preference, columns in AssetClass order.
            base_caps: [
                [40.0, 25.0, 10.0, 2.0, 45.0, 30.0, 40.0, 20.0],
                [60.0, 20.0, 20.0, 8.0, 35.0, 25.0, 30.0, 25.0],
                [75.0, 15.0, 30.0, 15.0, 25.0, 20.0, 20.0, 30.0],
            ],
            combo_caps: [10.0, 22.0, 35.0],
            early_equity_relax: 10.0,
            early_dynamic_relax: 5.0,
            late_equity_tighten: 10.0,
            late_dynamic_tighten: 5.0,

            combo_bias_threshold: 22.0,
            combo_bias: 1.0,

            gold_policies: [
                GoldPolicy {
                    target_min: 10.0,
                    target_max: 20.0,
                    hard_cap: 25.0,
                },
                GoldPolicy {
                    target_min: 5.0,
                    target_max: 12.0,
                    hard_cap: 20.0,
                },
                GoldPolicy {
                    target_min: 2.0,
                    target_max: 8.0,
                    hard_cap: 15.0,
                },
            ],

            lump_tiers: [
                ScalingTier {
                    threshold_eur: 1_000_000.0,
                    dynamic_cap: 5.0,
                    crypto_cap: 0.0,
                },
                ScalingTier {
                    threshold_eur: 500_000.0,
                    dynamic_cap: 8.0,
                    crypto_cap: 2.0,
                },
                ScalingTier {
                    threshold_eur: 250_000.0,
                    dynamic_cap: 12.0,
                    crypto_cap: 4.0,
                },
            ],
            monthly_tiers: [
                ScalingTier {
                    threshold_eur: 5_000.0,
                    dynamic_cap: 10.0,
                    crypto_cap: 3.0,
                },
                ScalingTier {
                    threshold_eur: 2_000.0,
                    dynamic_cap: 15.0,
                    crypto_cap: 5.0,
                },
            ],

            min_investment_eur: [0.0, 0.0, 1_000.0, 250.0, 2_500.0, 2_500.0, 0.0, 50_000.0],
            min_redistribution_gold_share: [0.7, 0.5, 0.3],

            bond_floor_pct: [20.0, 10.0, 0.0],
            cash_floor_min_pct: 5.0,
            cash_floor_max_pct: 10.0,

            tuner_step: 0.5,
            tuner_max_steps: 200,
            band_lower_fraction: [0.90, 0.85, 0.80],
            uptune_ceiling_pct: [6.0, 10.0, 14.0],
            real_estate_income_gate_eur: 4_000.0,
            real_estate_lump_gate_eur: 100_000.0,

            risk_cap_max_rounds: 10,
            direct_cut_after_round: 8,
            risk_cap_min_cut_pct: 2.0,
            risk_cap_cut_fraction: 0.2,
            high_risk_score: 4.0,

            optimizer_margin: 0.8,
            optimizer_min_volume_eur: 10_000.0,
            optimizer_max_iterations: 3,
            optimizer_headroom: 1.0,
            optimizer_risk_ceiling: 9.0,
            yield_boost_ceiling_pct: [0.3, 0.6, 1.0],

            hierarchy_transfer_pct: 2.0,
        }
    }
}

impl PolicyConfig {
    pub fn gold_policy(&self, preference: RiskPreference) -> GoldPolicy {
        self.gold_policies[preference.index()]
    }

    pub fn min_investment(&self, class: AssetClass) -> f64 {
        self.min_investment_eur[class.index()]
    }
}
