use serde::{Deserialize, Serialize};

pub const ASSET_COUNT: usize = 8;

/// Fixed asset-class universe. The declaration order is the canonical
/// storage order for every per-class table and every mix.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetClass {
    Equity,
    Gold,
    Dynamic,
    Crypto,
    GovBonds,
    CorpBonds,
    Cash,
    RealEstate,
}

impl AssetClass {
    pub const ALL: [AssetClass; ASSET_COUNT] = [
        AssetClass::Equity,
        AssetClass::Gold,
        AssetClass::Dynamic,
        AssetClass::Crypto,
        AssetClass::GovBonds,
        AssetClass::CorpBonds,
        AssetClass::Cash,
        AssetClass::RealEstate,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskPreference {
    Conservative,
    Balanced,
    Growth,
}

impl RiskPreference {
    pub const ALL: [RiskPreference; 3] = [
        RiskPreference::Conservative,
        RiskPreference::Balanced,
        RiskPreference::Growth,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Coarse investment-size/horizon bucket controlling caps and risk budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Early,
    Core,
    Late,
}

/// Percentage allocation across the fixed asset classes, summing to 100.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Mix {
    weights: [f64; ASSET_COUNT],
}

impl Mix {
    pub fn new(weights: [f64; ASSET_COUNT]) -> Self {
        Self { weights }
    }

    pub fn zero() -> Self {
        Self {
            weights: [0.0; ASSET_COUNT],
        }
    }

    pub fn weight(&self, class: AssetClass) -> f64 {
        self.weights[class.index()]
    }

    pub fn set_weight(&mut self, class: AssetClass, value: f64) {
        self.weights[class.index()] = value.max(0.0);
    }

    pub fn add_weight(&mut self, class: AssetClass, delta: f64) {
        let idx = class.index();
        self.weights[idx] = (self.weights[idx] + delta).max(0.0);
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn weights(&self) -> &[f64; ASSET_COUNT] {
        &self.weights
    }

    /// Rescales the mix so weights sum to exactly 100. Non-finite and
    /// negative entries are dropped first; an empty mix degrades to
    /// all-cash rather than NaN.
    pub fn normalize(&mut self) {
        for w in &mut self.weights {
            if !w.is_finite() || *w < 0.0 {
                *w = 0.0;
            }
        }
        let total = self.total();
        if total <= f64::EPSILON {
            self.weights = [0.0; ASSET_COUNT];
            self.weights[AssetClass::Cash.index()] = 100.0;
            return;
        }
        let scale = 100.0 / total;
        for w in &mut self.weights {
            *w *= scale;
        }
    }

    pub fn entries(&self) -> Vec<MixEntry> {
        AssetClass::ALL
            .into_iter()
            .map(|class| MixEntry {
                asset_class: class,
                weight: self.weight(class),
            })
            .collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixEntry {
    pub asset_class: AssetClass,
    pub weight: f64,
}

/// Planner inputs as collected by the application layer. All numerics are
/// expected non-negative; `sanitized` clamps anything malformed so every
/// downstream pass stays total.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub lump_sum_eur: f64,
    pub monthly_eur: f64,
    pub horizon_years: u32,
    pub monthly_income_eur: f64,
    pub fixed_expenses_eur: f64,
    pub variable_expenses_eur: f64,
    pub reserve_eur: f64,
    pub reserve_months: u32,
    pub goal_assets_eur: Option<f64>,
}

impl Profile {
    pub fn sanitized(&self) -> Profile {
        let clamp = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Profile {
            lump_sum_eur: clamp(self.lump_sum_eur),
            monthly_eur: clamp(self.monthly_eur),
            horizon_years: self.horizon_years,
            monthly_income_eur: clamp(self.monthly_income_eur),
            fixed_expenses_eur: clamp(self.fixed_expenses_eur),
            variable_expenses_eur: clamp(self.variable_expenses_eur),
            reserve_eur: clamp(self.reserve_eur),
            reserve_months: self.reserve_months,
            goal_assets_eur: self.goal_assets_eur.map(clamp).filter(|v| *v > 0.0),
        }
    }

    /// Lump sum plus all planned contributions over the horizon.
    pub fn effective_volume(&self) -> f64 {
        self.lump_sum_eur + self.monthly_eur * 12.0 * self.horizon_years as f64
    }
}

/// Enumerated tag emitted by a pass that had to intervene. Observational
/// only; the optional context carries a magnitude for analytics.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningTag {
    LumpScalingApplied,
    MonthlyScalingApplied,
    MinimumInvestmentApplied,
    BondFloorApplied,
    CashFloorApplied,
    RiskTargetLimited,
    RiskCapEnforced,
    ResidualRiskAboveBudget,
    YieldBoostLimited,
    HierarchyAdjusted,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentWarning {
    pub tag: WarningTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<f64>,
}

/// Iteration diagnostics per bounded pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassRounds {
    pub tuner_steps: u32,
    pub risk_cap_rounds: u32,
    pub optimizer_moves: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub expected_yield_annual: f64,
    pub risk_score: f64,
    pub risk_budget: f64,
    pub rounds: PassRounds,
}

/// Result of one preference pipeline: the adjusted mix plus everything a
/// caller needs for rendering and analytics.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub preference: RiskPreference,
    pub stage: Stage,
    pub mix: Mix,
    pub warnings: Vec<AdjustmentWarning>,
    pub metrics: Metrics,
}

/// The three per-preference outcomes after hierarchy reconciliation.
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub conservative: AllocationOutcome,
    pub balanced: AllocationOutcome,
    pub growth: AllocationOutcome,
}

impl PlanResult {
    pub fn outcome(&self, preference: RiskPreference) -> &AllocationOutcome {
        match preference {
            RiskPreference::Conservative => &self.conservative,
            RiskPreference::Balanced => &self.balanced,
            RiskPreference::Growth => &self.growth,
        }
    }
}
