use super::params::{PolicyConfig, ScalingTier};
use super::types::{ASSET_COUNT, AssetClass, Mix, Profile, RiskPreference, Stage};

/// Per-class maximum weights plus the joint ceiling on the two most
/// volatile classes. Derived once per run from stage and preference,
/// then tightened by the deposit scaling tiers; every later pass reads
/// the same tightened set so nothing re-inflates a scaled-down class.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CapSet {
    caps: [f64; ASSET_COUNT],
    combo_cap: f64,
}

impl CapSet {
    pub fn cap(&self, class: AssetClass) -> f64 {
        self.caps[class.index()]
    }

    pub fn combo_cap(&self) -> f64 {
        self.combo_cap
    }

    pub fn tighten(&mut self, class: AssetClass, cap: f64) {
        let idx = class.index();
        self.caps[idx] = self.caps[idx].min(cap.max(0.0));
    }

    /// Remaining headroom under the per-class cap, never negative.
    pub fn room(&self, class: AssetClass, mix: &Mix) -> f64 {
        (self.cap(class) - mix.weight(class)).max(0.0)
    }

    pub fn combo_room(&self, mix: &Mix) -> f64 {
        let combo = mix.weight(AssetClass::Dynamic) + mix.weight(AssetClass::Crypto);
        (self.combo_cap - combo).max(0.0)
    }
}

/// Maps plan volume (and optional goal coverage) to an investment stage.
/// Exact boundary values resolve to the later, stricter stage.
pub fn classify_stage(profile: &Profile, config: &PolicyConfig) -> Stage {
    let volume = profile.effective_volume();
    let mut stage = if volume < config.stage_early_limit_eur {
        Stage::Early
    } else if volume < config.stage_core_limit_eur {
        Stage::Core
    } else {
        Stage::Late
    };

    if let Some(goal) = profile.goal_assets_eur {
        if goal > 0.0 && volume >= goal {
            stage = match stage {
                Stage::Early => Stage::Core,
                Stage::Core | Stage::Late => Stage::Late,
            };
        }
    }

    stage
}

pub fn risk_budget(preference: RiskPreference, stage: Stage, config: &PolicyConfig) -> f64 {
    let base = config.risk_budgets[preference.index()];
    match stage {
        Stage::Early => base + config.stage_budget_nudge,
        Stage::Core => base,
        Stage::Late => base - config.stage_budget_nudge,
    }
}

/// Stage- and preference-specific cap table. Early relaxes the equity and
/// dynamic caps, late tightens them; the gold cap is additionally bounded
/// by the preference's gold hard cap.
pub fn cap_set(preference: RiskPreference, stage: Stage, config: &PolicyConfig) -> CapSet {
    let mut caps = config.base_caps[preference.index()];

    let equity = AssetClass::Equity.index();
    let dynamic = AssetClass::Dynamic.index();
    match stage {
        Stage::Early => {
            caps[equity] += config.early_equity_relax;
            caps[dynamic] += config.early_dynamic_relax;
        }
        Stage::Core => {}
        Stage::Late => {
            caps[equity] = (caps[equity] - config.late_equity_tighten).max(0.0);
            caps[dynamic] = (caps[dynamic] - config.late_dynamic_tighten).max(0.0);
        }
    }

    let gold = AssetClass::Gold.index();
    caps[gold] = caps[gold].min(config.gold_policy(preference).hard_cap);

    CapSet {
        caps,
        combo_cap: config.combo_caps[preference.index()],
    }
}

/// Strictest lump-sum tier the profile hits, if any.
pub fn lump_tier<'a>(profile: &Profile, config: &'a PolicyConfig) -> Option<&'a ScalingTier> {
    config
        .lump_tiers
        .iter()
        .find(|tier| profile.lump_sum_eur >= tier.threshold_eur)
}

/// Strictest monthly-contribution tier the profile hits, if any.
pub fn monthly_tier<'a>(profile: &Profile, config: &'a PolicyConfig) -> Option<&'a ScalingTier> {
    config
        .monthly_tiers
        .iter()
        .find(|tier| profile.monthly_eur >= tier.threshold_eur)
}

/// Whether a class's EUR stake clears its published minimum at the given
/// weight. Classes without a minimum always qualify.
pub fn meets_minimum(
    class: AssetClass,
    weight: f64,
    volume: f64,
    config: &PolicyConfig,
) -> bool {
    let min = config.min_investment(class);
    min <= 0.0 || weight / 100.0 * volume + 1e-9 >= min
}
