use tracing::debug;

use super::hierarchy::enforce_hierarchy;
use super::params::{PolicyConfig, ScalingTier, base_mix, params_for};
use super::policy::{
    CapSet, cap_set, classify_stage, lump_tier, meets_minimum, monthly_tier, risk_budget,
};
use super::scoring::{composite_risk, expected_yield};
use super::types::{
    AdjustmentWarning, AllocationOutcome, AssetClass, Metrics, Mix, PassRounds, PlanResult,
    Profile, RiskPreference, Stage, WarningTag,
};

/// Everything a pass needs, derived once per invocation. Caps are already
/// tightened by the deposit scaling tiers when this is built.
struct PassContext<'a> {
    profile: Profile,
    preference: RiskPreference,
    stage: Stage,
    caps: CapSet,
    budget: f64,
    volume: f64,
    cash_floor_pct: f64,
    config: &'a PolicyConfig,
}

impl PassContext<'_> {
    fn risk(&self, mix: &Mix) -> f64 {
        composite_risk(mix, self.preference, self.config)
    }

    /// Gold headroom under both the stage cap and the gold hard cap.
    fn gold_room(&self, mix: &Mix) -> f64 {
        let cap = self
            .caps
            .cap(AssetClass::Gold)
            .min(self.config.gold_policy(self.preference).hard_cap);
        (cap - mix.weight(AssetClass::Gold)).max(0.0)
    }

    fn meets_minimum(&self, class: AssetClass, weight: f64) -> bool {
        meets_minimum(class, weight, self.volume, self.config)
    }
}

struct WarningLog {
    entries: Vec<AdjustmentWarning>,
}

impl WarningLog {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// First occurrence wins; repeated tags are dropped so callers get a
    /// deduplicated, emission-ordered list.
    fn push(&mut self, tag: WarningTag, context: Option<f64>) {
        if self.entries.iter().any(|w| w.tag == tag) {
            return;
        }
        self.entries.push(AdjustmentWarning { tag, context });
    }

    fn into_vec(self) -> Vec<AdjustmentWarning> {
        self.entries
    }
}

/// Runs the full adjustment pipeline for one preference, starting from
/// the static preset.
pub fn adjust_allocation(
    profile: &Profile,
    preference: RiskPreference,
    config: &PolicyConfig,
) -> AllocationOutcome {
    adjust_allocation_from(profile, preference, base_mix(preference), config)
}

/// Same pipeline from a caller-supplied base mix. The mix is recomputed
/// from scratch; nothing is mutated incrementally across invocations.
pub fn adjust_allocation_from(
    profile: &Profile,
    preference: RiskPreference,
    base: Mix,
    config: &PolicyConfig,
) -> AllocationOutcome {
    let profile = profile.sanitized();
    let stage = classify_stage(&profile, config);
    let budget = risk_budget(preference, stage, config);
    let volume = profile.effective_volume();
    let mut caps = cap_set(preference, stage, config);

    let mut warnings = WarningLog::new();
    let mut rounds = PassRounds::default();
    let mut mix = base;
    mix.normalize();

    if let Some(tier) = lump_tier(&profile, config) {
        apply_deposit_scaling(
            &mut mix,
            &mut caps,
            tier,
            &mut warnings,
            WarningTag::LumpScalingApplied,
        );
    }
    if let Some(tier) = monthly_tier(&profile, config) {
        apply_deposit_scaling(
            &mut mix,
            &mut caps,
            tier,
            &mut warnings,
            WarningTag::MonthlyScalingApplied,
        );
    }

    let cash_floor_pct = cash_floor_pct(&profile, volume, &caps, config);
    let ctx = PassContext {
        profile,
        preference,
        stage,
        caps,
        budget,
        volume,
        cash_floor_pct,
        config,
    };

    apply_minimum_investment(&mut mix, &ctx, &mut warnings);
    apply_bond_floor(&mut mix, &ctx, &mut warnings);
    apply_cash_floor(&mut mix, &ctx, &mut warnings);
    tune_risk(&mut mix, &ctx, &mut warnings, &mut rounds);
    enforce_caps(&mut mix, &ctx);
    enforce_risk_cap(&mut mix, &ctx, &mut warnings, &mut rounds);
    optimize_yield(&mut mix, &ctx, &mut warnings, &mut rounds);
    enforce_caps(&mut mix, &ctx);

    let metrics = Metrics {
        expected_yield_annual: expected_yield(&mix, preference),
        risk_score: composite_risk(&mix, preference, config),
        risk_budget: budget,
        rounds,
    };
    debug!(
        ?preference,
        ?stage,
        risk = metrics.risk_score,
        yield_pct = metrics.expected_yield_annual,
        "allocation adjusted"
    );

    AllocationOutcome {
        preference,
        stage,
        mix,
        warnings: warnings.into_vec(),
        metrics,
    }
}

/// Runs the three preference pipelines independently, then reconciles
/// them so the cross-profile ordering invariants hold.
pub fn plan_all(profile: &Profile, config: &PolicyConfig) -> PlanResult {
    let conservative = adjust_allocation(profile, RiskPreference::Conservative, config);
    let balanced = adjust_allocation(profile, RiskPreference::Balanced, config);
    let growth = adjust_allocation(profile, RiskPreference::Growth, config);

    let mut result = PlanResult {
        conservative,
        balanced,
        growth,
    };
    enforce_hierarchy(&mut result, config);
    result
}

/// Tightens the dynamic/crypto caps to the tier, clamps both classes and
/// boosts the safe classes with the freed weight.
fn apply_deposit_scaling(
    mix: &mut Mix,
    caps: &mut CapSet,
    tier: &ScalingTier,
    warnings: &mut WarningLog,
    tag: WarningTag,
) {
    caps.tighten(AssetClass::Dynamic, tier.dynamic_cap);
    caps.tighten(AssetClass::Crypto, tier.crypto_cap);

    let mut freed = 0.0;
    for class in [AssetClass::Dynamic, AssetClass::Crypto] {
        let over = mix.weight(class) - caps.cap(class);
        if over > 1e-9 {
            mix.add_weight(class, -over);
            freed += over;
        }
    }

    if freed > 1e-9 {
        boost_safe_classes(mix, freed);
        mix.normalize();
        warnings.push(tag, Some(freed));
    }
}

fn boost_safe_classes(mix: &mut Mix, freed: f64) {
    const SAFE: [AssetClass; 3] = [AssetClass::GovBonds, AssetClass::CorpBonds, AssetClass::Cash];
    let weights = [
        mix.weight(SAFE[0]),
        mix.weight(SAFE[1]),
        mix.weight(SAFE[2]),
    ];
    let total: f64 = weights.iter().sum();
    if total <= 1e-9 {
        let share = freed / SAFE.len() as f64;
        for class in SAFE {
            mix.add_weight(class, share);
        }
        return;
    }
    for (class, weight) in SAFE.into_iter().zip(weights) {
        mix.add_weight(class, freed * weight / total);
    }
}

/// Zeroes every class whose absolute stake falls below its published
/// minimum and hands the freed weight to gold and equity in the
/// preference ratio. Idempotent on a compliant mix.
fn apply_minimum_investment(mix: &mut Mix, ctx: &PassContext, warnings: &mut WarningLog) {
    let mut freed = 0.0;
    for class in AssetClass::ALL {
        let weight = mix.weight(class);
        if weight > 0.0 && !ctx.meets_minimum(class, weight) {
            mix.set_weight(class, 0.0);
            freed += weight;
        }
    }
    if freed <= 1e-9 {
        return;
    }

    let gold_share = ctx.config.min_redistribution_gold_share[ctx.preference.index()];
    let to_gold = (freed * gold_share).min(ctx.gold_room(mix));
    mix.add_weight(AssetClass::Gold, to_gold);
    mix.add_weight(AssetClass::Equity, freed - to_gold);
    mix.normalize();
    warnings.push(WarningTag::MinimumInvestmentApplied, Some(freed));
}

/// Conservative and balanced profiles keep a minimum combined bond
/// weight, funded from equity then dynamic, provided the tranches can
/// clear their EUR minimums at the floored weight.
fn apply_bond_floor(mix: &mut Mix, ctx: &PassContext, warnings: &mut WarningLog) {
    let floor = ctx.config.bond_floor_pct[ctx.preference.index()];
    if floor <= 0.0 {
        return;
    }
    let half = floor / 2.0;
    if !ctx.meets_minimum(AssetClass::GovBonds, half)
        || !ctx.meets_minimum(AssetClass::CorpBonds, half)
    {
        return;
    }

    let current = mix.weight(AssetClass::GovBonds) + mix.weight(AssetClass::CorpBonds);
    let mut shortfall = floor - current;
    if shortfall <= 1e-9 {
        return;
    }

    let mut moved = 0.0;
    for source in [AssetClass::Equity, AssetClass::Dynamic] {
        if shortfall <= 1e-9 {
            break;
        }
        let take = mix.weight(source).min(shortfall);
        if take <= 0.0 {
            continue;
        }
        mix.add_weight(source, -take);
        let gov_deficit = (half - mix.weight(AssetClass::GovBonds)).max(0.0);
        let to_gov = take.min(gov_deficit);
        mix.add_weight(AssetClass::GovBonds, to_gov);
        mix.add_weight(AssetClass::CorpBonds, take - to_gov);
        shortfall -= take;
        moved += take;
    }

    if moved > 1e-9 {
        mix.normalize();
        warnings.push(WarningTag::BondFloorApplied, Some(moved));
    }
}

/// Percentage floor on cash implied by an under-funded emergency reserve.
/// Zero when the reserve covers the stated months of outgoings.
fn cash_floor_pct(profile: &Profile, volume: f64, caps: &CapSet, config: &PolicyConfig) -> f64 {
    if profile.reserve_months == 0 || volume <= 0.0 {
        return 0.0;
    }
    let outgoings = profile.fixed_expenses_eur + profile.variable_expenses_eur;
    if outgoings <= 0.0 {
        return 0.0;
    }
    let required = profile.reserve_months as f64 * outgoings;
    if profile.reserve_eur + 1e-9 >= required {
        return 0.0;
    }
    let shortfall = required - profile.reserve_eur;
    (shortfall / volume * 100.0)
        .clamp(config.cash_floor_min_pct, config.cash_floor_max_pct)
        .min(caps.cap(AssetClass::Cash))
}

fn apply_cash_floor(mix: &mut Mix, ctx: &PassContext, warnings: &mut WarningLog) {
    let mut need = ctx.cash_floor_pct - mix.weight(AssetClass::Cash);
    if need <= 1e-9 {
        return;
    }

    let mut moved = 0.0;
    for source in [
        AssetClass::Crypto,
        AssetClass::Dynamic,
        AssetClass::Equity,
        AssetClass::RealEstate,
    ] {
        if need <= 1e-9 {
            break;
        }
        let take = mix.weight(source).min(need);
        if take <= 0.0 {
            continue;
        }
        mix.add_weight(source, -take);
        mix.add_weight(AssetClass::Cash, take);
        need -= take;
        moved += take;
    }

    if moved > 1e-9 {
        mix.normalize();
        warnings.push(WarningTag::CashFloorApplied, Some(moved));
    }
}

/// How much of a class the tuner may drain. Cash never goes below the
/// emergency floor.
fn source_available(mix: &Mix, ctx: &PassContext, class: AssetClass) -> f64 {
    let weight = mix.weight(class);
    if class == AssetClass::Cash {
        (weight - ctx.cash_floor_pct).max(0.0)
    } else {
        weight
    }
}

/// Bidirectional risk tuner. Moves fixed micro-steps toward the profile
/// target band, recomputing risk after every move. Greedy, not exact; a
/// short stop emits a warning instead of failing.
fn tune_risk(mix: &mut Mix, ctx: &PassContext, warnings: &mut WarningLog, rounds: &mut PassRounds) {
    let risk = ctx.risk(mix);
    if risk > ctx.budget + ctx.config.risk_tolerance {
        down_tune(mix, ctx, warnings, rounds);
        return;
    }
    let lower = ctx.budget * ctx.config.band_lower_fraction[ctx.preference.index()];
    if risk < lower {
        up_tune(mix, ctx, warnings, rounds, lower);
    }
}

fn down_tune(mix: &mut Mix, ctx: &PassContext, warnings: &mut WarningLog, rounds: &mut PassRounds) {
    const SOURCES: [AssetClass; 3] = [AssetClass::Equity, AssetClass::RealEstate, AssetClass::Gold];
    let step = ctx.config.tuner_step;

    for _ in 0..ctx.config.tuner_max_steps {
        if ctx.risk(mix) <= ctx.budget {
            break;
        }
        let Some(source) = SOURCES.into_iter().find(|c| mix.weight(*c) >= step) else {
            break;
        };
        mix.add_weight(source, -step);
        if source == AssetClass::Gold {
            mix.add_weight(AssetClass::Cash, step);
        } else {
            let to_gold = (step * 0.6).min(ctx.gold_room(mix));
            mix.add_weight(AssetClass::Gold, to_gold);
            mix.add_weight(AssetClass::Cash, step - to_gold);
        }
        mix.normalize();
        rounds.tuner_steps += 1;
    }

    let residual = ctx.risk(mix) - ctx.budget;
    if residual > ctx.config.risk_tolerance {
        warnings.push(WarningTag::RiskTargetLimited, Some(residual));
    }
}

fn up_tune(
    mix: &mut Mix,
    ctx: &PassContext,
    warnings: &mut WarningLog,
    rounds: &mut PassRounds,
    lower: f64,
) {
    const SOURCES: [AssetClass; 4] = [
        AssetClass::Cash,
        AssetClass::GovBonds,
        AssetClass::CorpBonds,
        AssetClass::Gold,
    ];
    let step = ctx.config.tuner_step;
    let ceiling = ctx.config.uptune_ceiling_pct[ctx.preference.index()];
    let mut moved_total = 0.0;
    let mut limited = false;

    for _ in 0..ctx.config.tuner_max_steps {
        if ctx.risk(mix) >= lower {
            break;
        }
        if moved_total + step > ceiling + 1e-9 {
            limited = true;
            break;
        }
        let Some(source) = SOURCES
            .into_iter()
            .find(|c| source_available(mix, ctx, *c) >= step)
        else {
            limited = true;
            break;
        };
        let rooms = uptune_target_rooms(mix, ctx);
        let total_room: f64 = rooms.iter().map(|(_, room)| room).sum();
        if total_room < step {
            limited = true;
            break;
        }

        mix.add_weight(source, -step);
        for (class, room) in rooms {
            if room > 0.0 {
                mix.add_weight(class, step * room / total_room);
            }
        }
        mix.normalize();
        moved_total += step;
        rounds.tuner_steps += 1;
    }

    if limited {
        let residual = (lower - ctx.risk(mix)).max(0.0);
        warnings.push(WarningTag::RiskTargetLimited, Some(residual));
    }
}

/// Cap room per up-tune target. Dynamic is gated by its EUR minimum and
/// the combo cap; real estate by income or lump size plus its minimum.
fn uptune_target_rooms(mix: &Mix, ctx: &PassContext) -> [(AssetClass, f64); 3] {
    let step = ctx.config.tuner_step;

    let equity_room = ctx.caps.room(AssetClass::Equity, mix);

    let dynamic_room = {
        let prospective = mix.weight(AssetClass::Dynamic) + step;
        if ctx.meets_minimum(AssetClass::Dynamic, prospective) {
            ctx.caps
                .room(AssetClass::Dynamic, mix)
                .min(ctx.caps.combo_room(mix))
        } else {
            0.0
        }
    };

    let real_estate_room = {
        let gated = ctx.profile.monthly_income_eur >= ctx.config.real_estate_income_gate_eur
            || ctx.profile.lump_sum_eur >= ctx.config.real_estate_lump_gate_eur;
        let prospective = mix.weight(AssetClass::RealEstate).max(step);
        if gated && ctx.meets_minimum(AssetClass::RealEstate, prospective) {
            ctx.caps.room(AssetClass::RealEstate, mix)
        } else {
            0.0
        }
    };

    [
        (AssetClass::Equity, equity_room),
        (AssetClass::Dynamic, dynamic_room),
        (AssetClass::RealEstate, real_estate_room),
    ]
}

/// Clamps every class to its cap and the volatile pair to the combo cap
/// (70% of the overage from dynamic, 30% from crypto). Returns the total
/// weight removed.
fn clamp_to_caps(mix: &mut Mix, ctx: &PassContext) -> f64 {
    let mut overflow = 0.0;
    for class in AssetClass::ALL {
        let over = mix.weight(class) - ctx.caps.cap(class);
        if over > 1e-9 {
            mix.add_weight(class, -over);
            overflow += over;
        }
    }

    let combo = mix.weight(AssetClass::Dynamic) + mix.weight(AssetClass::Crypto);
    let combo_over = combo - ctx.caps.combo_cap();
    if combo_over > 1e-9 {
        let from_dynamic = (combo_over * 0.7).min(mix.weight(AssetClass::Dynamic));
        let from_crypto = (combo_over - from_dynamic).min(mix.weight(AssetClass::Crypto));
        let shortfall = combo_over - from_dynamic - from_crypto;
        let extra_dynamic = shortfall.min(mix.weight(AssetClass::Dynamic) - from_dynamic);
        mix.add_weight(AssetClass::Dynamic, -(from_dynamic + extra_dynamic));
        mix.add_weight(AssetClass::Crypto, -from_crypto);
        overflow += from_dynamic + extra_dynamic + from_crypto;
    }

    overflow
}

/// Stage-aware cap enforcement: clamp, then refill the stage-ordered
/// bucket list to cap. One pass suffices because cap sums stay at or
/// above 100.
fn enforce_caps(mix: &mut Mix, ctx: &PassContext) {
    let overflow = clamp_to_caps(mix, ctx);
    if overflow > 1e-9 {
        redistribute_overflow(mix, ctx, overflow);
    }
    mix.normalize();
}

fn redistribute_overflow(mix: &mut Mix, ctx: &PassContext, amount: f64) {
    let order: &[AssetClass] = match ctx.stage {
        Stage::Early | Stage::Core => &[
            AssetClass::Equity,
            AssetClass::GovBonds,
            AssetClass::CorpBonds,
            AssetClass::Gold,
            AssetClass::Cash,
        ],
        Stage::Late => &[
            AssetClass::GovBonds,
            AssetClass::CorpBonds,
            AssetClass::Gold,
            AssetClass::Equity,
            AssetClass::Cash,
        ],
    };

    let mut remaining = amount;
    for &class in order {
        if remaining <= 1e-9 {
            break;
        }
        // A class zeroed for its minimum stays out of the mix.
        if !ctx.meets_minimum(class, mix.weight(class)) {
            continue;
        }
        let add = remaining.min(ctx.caps.room(class, mix));
        if add > 0.0 {
            mix.add_weight(class, add);
            remaining -= add;
        }
    }
    if remaining > 1e-9 {
        // Terminal sink; cap sums make this a rounding-level remainder.
        mix.add_weight(AssetClass::Cash, remaining);
    }
}

/// Final defense against a risk overshoot: repeatedly cut the riskiest
/// non-sink class into the bond tranches (gold secondarily, bounded by
/// the gold hard cap). Late rounds switch to direct cuts across every
/// high-risk class.
fn enforce_risk_cap(
    mix: &mut Mix,
    ctx: &PassContext,
    warnings: &mut WarningLog,
    rounds: &mut PassRounds,
) {
    const SINKS: [AssetClass; 3] = [AssetClass::GovBonds, AssetClass::CorpBonds, AssetClass::Gold];
    let tolerance = ctx.config.risk_tolerance;
    if ctx.risk(mix) <= ctx.budget + tolerance {
        return;
    }

    let mut intervened = false;
    for round in 1..=ctx.config.risk_cap_max_rounds {
        if ctx.risk(mix) <= ctx.budget {
            break;
        }
        rounds.risk_cap_rounds = round;

        if round > ctx.config.direct_cut_after_round {
            intervened |= direct_cut(mix, ctx);
            mix.normalize();
            continue;
        }

        let candidate = AssetClass::ALL
            .into_iter()
            .filter(|c| !SINKS.contains(c) && *c != AssetClass::Cash && mix.weight(*c) > 1e-9)
            .max_by(|a, b| {
                params_for(*a, ctx.preference)
                    .risk_score
                    .total_cmp(&params_for(*b, ctx.preference).risk_score)
            });
        let Some(class) = candidate else {
            break;
        };

        let weight = mix.weight(class);
        let cut = (weight * ctx.config.risk_cap_cut_fraction)
            .max(ctx.config.risk_cap_min_cut_pct)
            .min(weight);
        mix.add_weight(class, -cut);
        sink_risk(mix, ctx, cut);
        mix.normalize();
        intervened = true;
    }

    if intervened {
        warnings.push(WarningTag::RiskCapEnforced, Some(rounds.risk_cap_rounds as f64));
    }
    let residual = ctx.risk(mix) - ctx.budget;
    if residual > tolerance {
        warnings.push(WarningTag::ResidualRiskAboveBudget, Some(residual));
    }
}

fn sink_risk(mix: &mut Mix, ctx: &PassContext, amount: f64) {
    let mut remaining = amount;
    for class in [AssetClass::GovBonds, AssetClass::CorpBonds] {
        if remaining <= 1e-9 {
            break;
        }
        let add = remaining.min(ctx.caps.room(class, mix));
        if add > 0.0 {
            mix.add_weight(class, add);
            remaining -= add;
        }
    }
    if remaining > 1e-9 {
        let add = remaining.min(ctx.gold_room(mix));
        if add > 0.0 {
            mix.add_weight(AssetClass::Gold, add);
            remaining -= add;
        }
    }
    if remaining > 1e-9 {
        mix.add_weight(AssetClass::Cash, remaining);
    }
}

/// Halves every high-risk class at once, pushing the freed weight into
/// the bond tranches only. The cut is scaled down to what the tranches
/// can absorb so no capped class gets re-inflated.
fn direct_cut(mix: &mut Mix, ctx: &PassContext) -> bool {
    let bond_room =
        ctx.caps.room(AssetClass::GovBonds, mix) + ctx.caps.room(AssetClass::CorpBonds, mix);
    if bond_room <= 1e-9 {
        return false;
    }

    let is_high_risk =
        |class: AssetClass| params_for(class, ctx.preference).risk_score >= ctx.config.high_risk_score;

    let mut desired = 0.0;
    for class in AssetClass::ALL {
        if is_high_risk(class) {
            desired += mix.weight(class) / 2.0;
        }
    }
    if desired <= 1e-9 {
        return false;
    }

    let scale = (bond_room / desired).min(1.0);
    let mut placed = 0.0;
    for class in AssetClass::ALL {
        if is_high_risk(class) {
            let cut = mix.weight(class) / 2.0 * scale;
            if cut > 0.0 {
                mix.add_weight(class, -cut);
                placed += cut;
            }
        }
    }

    let to_gov = placed.min(ctx.caps.room(AssetClass::GovBonds, mix));
    mix.add_weight(AssetClass::GovBonds, to_gov);
    mix.add_weight(AssetClass::CorpBonds, placed - to_gov);
    true
}

struct YieldMove {
    from: AssetClass,
    to: AssetClass,
    step: f64,
}

const YIELD_MOVES: [YieldMove; 8] = [
    YieldMove {
        from: AssetClass::Cash,
        to: AssetClass::Equity,
        step: 2.0,
    },
    YieldMove {
        from: AssetClass::Cash,
        to: AssetClass::CorpBonds,
        step: 2.0,
    },
    YieldMove {
        from: AssetClass::Cash,
        to: AssetClass::Dynamic,
        step: 1.0,
    },
    YieldMove {
        from: AssetClass::GovBonds,
        to: AssetClass::CorpBonds,
        step: 2.0,
    },
    YieldMove {
        from: AssetClass::GovBonds,
        to: AssetClass::Equity,
        step: 2.0,
    },
    YieldMove {
        from: AssetClass::CorpBonds,
        to: AssetClass::Equity,
        step: 2.0,
    },
    YieldMove {
        from: AssetClass::Gold,
        to: AssetClass::Equity,
        step: 1.0,
    },
    YieldMove {
        from: AssetClass::Gold,
        to: AssetClass::Dynamic,
        step: 1.0,
    },
];

/// Greedy local search over the fixed move catalogue. Runs only with
/// risk headroom and a plan volume worth optimizing; every accepted move
/// is the best remaining yield improvement that stays inside the caps
/// and the optimizer risk limit.
fn optimize_yield(
    mix: &mut Mix,
    ctx: &PassContext,
    warnings: &mut WarningLog,
    rounds: &mut PassRounds,
) {
    if ctx.risk(mix) >= ctx.budget - ctx.config.optimizer_margin {
        return;
    }
    if ctx.volume < ctx.config.optimizer_min_volume_eur {
        return;
    }

    let risk_limit = (ctx.budget + ctx.config.optimizer_headroom).min(ctx.config.optimizer_risk_ceiling);
    let ceiling = ctx.config.yield_boost_ceiling_pct[ctx.preference.index()];
    let mut boosted = 0.0;

    for _ in 0..ctx.config.optimizer_max_iterations {
        let current_yield = expected_yield(mix, ctx.preference);
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate_move) in YIELD_MOVES.iter().enumerate() {
            let Some(candidate) = try_move(mix, ctx, candidate_move, risk_limit) else {
                continue;
            };
            let delta = expected_yield(&candidate, ctx.preference) - current_yield;
            if delta <= 1e-9 {
                continue;
            }
            if best.is_none_or(|(_, d)| delta > d) {
                best = Some((idx, delta));
            }
        }
        let Some((idx, delta)) = best else {
            break;
        };
        if boosted + delta > ceiling + 1e-9 {
            warnings.push(WarningTag::YieldBoostLimited, Some(boosted));
            break;
        }
        let chosen = &YIELD_MOVES[idx];
        mix.add_weight(chosen.from, -chosen.step);
        mix.add_weight(chosen.to, chosen.step);
        boosted += delta;
        rounds.optimizer_moves += 1;
    }

    optimizer_safety_sweep(mix, ctx);
}

fn try_move(mix: &Mix, ctx: &PassContext, mv: &YieldMove, risk_limit: f64) -> Option<Mix> {
    if mv.from == AssetClass::Cash {
        if source_available(mix, ctx, AssetClass::Cash) + 1e-9 < mv.step {
            return None;
        }
    } else if mix.weight(mv.from) + 1e-9 < mv.step {
        return None;
    }

    let mut candidate = *mix;
    candidate.add_weight(mv.from, -mv.step);
    candidate.add_weight(mv.to, mv.step);

    if candidate.weight(mv.to) > ctx.caps.cap(mv.to) + 1e-9 {
        return None;
    }
    let combo = candidate.weight(AssetClass::Dynamic) + candidate.weight(AssetClass::Crypto);
    if combo > ctx.caps.combo_cap() + 1e-9 {
        return None;
    }
    if !ctx.meets_minimum(mv.to, candidate.weight(mv.to)) {
        return None;
    }
    let from_after = candidate.weight(mv.from);
    if from_after > 1e-9 && !ctx.meets_minimum(mv.from, from_after) {
        return None;
    }
    if ctx.risk(&candidate) > risk_limit + 1e-9 {
        return None;
    }
    Some(candidate)
}

/// Re-clamps anything the optimizer pushed over a cap and parks the
/// overflow in the preference safety sinks.
fn optimizer_safety_sweep(mix: &mut Mix, ctx: &PassContext) {
    let overflow = clamp_to_caps(mix, ctx);
    if overflow > 1e-9 {
        let sinks: &[AssetClass] = match ctx.preference {
            RiskPreference::Conservative => &[AssetClass::GovBonds, AssetClass::Cash],
            RiskPreference::Balanced => &[AssetClass::GovBonds, AssetClass::CorpBonds],
            RiskPreference::Growth => &[AssetClass::CorpBonds, AssetClass::Equity],
        };
        let mut remaining = overflow;
        for &class in sinks {
            if remaining <= 1e-9 {
                break;
            }
            if !ctx.meets_minimum(class, mix.weight(class)) {
                continue;
            }
            let add = remaining.min(ctx.caps.room(class, mix));
            if add > 0.0 {
                mix.add_weight(class, add);
                remaining -= add;
            }
        }
        if remaining > 1e-9 {
            mix.add_weight(AssetClass::Cash, remaining);
        }
    }
    mix.normalize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn profile(lump: f64, monthly: f64, horizon: u32) -> Profile {
        Profile {
            lump_sum_eur: lump,
            monthly_eur: monthly,
            horizon_years: horizon,
            monthly_income_eur: 0.0,
            fixed_expenses_eur: 0.0,
            variable_expenses_eur: 0.0,
            reserve_eur: 0.0,
            reserve_months: 0,
            goal_assets_eur: None,
        }
    }

    fn has_warning(outcome: &AllocationOutcome, tag: WarningTag) -> bool {
        outcome.warnings.iter().any(|w| w.tag == tag)
    }

    fn assert_outcome_invariants(outcome: &AllocationOutcome, config: &PolicyConfig) {
        assert!(
            (outcome.mix.total() - 100.0).abs() <= 0.05,
            "{:?}: weights must sum to 100, got {}",
            outcome.preference,
            outcome.mix.total()
        );
        for class in AssetClass::ALL {
            let weight = outcome.mix.weight(class);
            assert!(weight.is_finite(), "{:?}/{class:?} must be finite", outcome.preference);
            assert!(weight >= -1e-9, "{:?}/{class:?} must be non-negative", outcome.preference);
        }

        let caps = cap_set(outcome.preference, outcome.stage, config);
        for class in AssetClass::ALL {
            assert!(
                outcome.mix.weight(class) <= caps.cap(class) + 0.1,
                "{:?}/{class:?} exceeds its cap: {} > {}",
                outcome.preference,
                outcome.mix.weight(class),
                caps.cap(class)
            );
        }
        let combo =
            outcome.mix.weight(AssetClass::Dynamic) + outcome.mix.weight(AssetClass::Crypto);
        assert!(combo <= caps.combo_cap() + 0.1);

        let gold_cap = config.gold_policy(outcome.preference).hard_cap;
        assert!(outcome.mix.weight(AssetClass::Gold) <= gold_cap + 0.1);

        assert!(
            outcome.metrics.risk_score <= outcome.metrics.risk_budget + 1.5,
            "{:?}: risk {} exceeds budget {} beyond tolerance",
            outcome.preference,
            outcome.metrics.risk_score,
            outcome.metrics.risk_budget
        );

        let mut seen = Vec::new();
        for warning in &outcome.warnings {
            assert!(!seen.contains(&warning.tag), "warnings must be deduplicated");
            seen.push(warning.tag);
        }
    }

    #[test]
    fn monthly_saver_balanced_respects_gold_cap() {
        let config = PolicyConfig::default();
        let outcome = adjust_allocation(
            &profile(0.0, 600.0, 20),
            RiskPreference::Balanced,
            &config,
        );
        assert_outcome_invariants(&outcome, &config);
        assert!(outcome.mix.weight(AssetClass::Gold) <= 20.0 + 0.1);
    }

    #[test]
    fn growth_outearns_conservative_on_standard_profile() {
        let config = PolicyConfig::default();
        let input = profile(10_000.0, 300.0, 30);
        let growth = adjust_allocation(&input, RiskPreference::Growth, &config);
        let conservative = adjust_allocation(&input, RiskPreference::Conservative, &config);
        assert_outcome_invariants(&growth, &config);
        assert_outcome_invariants(&conservative, &config);

        assert!(
            growth.metrics.expected_yield_annual
                > conservative.metrics.expected_yield_annual + 5.0,
            "growth yield {} vs conservative {}",
            growth.metrics.expected_yield_annual,
            conservative.metrics.expected_yield_annual
        );
        assert!(growth.metrics.risk_score > conservative.metrics.risk_score + 2.0);
    }

    #[test]
    fn three_preferences_keep_risk_and_crypto_ordering() {
        let config = PolicyConfig::default();
        let result = plan_all(&profile(45_800.0, 200.0, 30), &config);
        for preference in RiskPreference::ALL {
            assert_outcome_invariants(result.outcome(preference), &config);
        }

        let cons = result.conservative.metrics.risk_score;
        let bal = result.balanced.metrics.risk_score;
        let growth = result.growth.metrics.risk_score;
        assert!(cons < bal, "conservative risk {cons} must stay below balanced {bal}");
        assert!(bal <= growth + 1e-9);

        assert!(
            result.growth.mix.weight(AssetClass::Crypto)
                >= result.balanced.mix.weight(AssetClass::Crypto) - 1e-9
        );
        assert!(
            result.growth.mix.weight(AssetClass::Cash)
                <= result.balanced.mix.weight(AssetClass::Cash) + 1e-9
        );
    }

    #[test]
    fn tiny_amounts_still_produce_a_full_mix() {
        // Regression for the "portfolio does not respond" defect at small
        // plan volumes.
        let config = PolicyConfig::default();
        let outcome = adjust_allocation(
            &profile(2_489.0, 51.0, 10),
            RiskPreference::Balanced,
            &config,
        );
        assert_outcome_invariants(&outcome, &config);
        assert!(has_warning(&outcome, WarningTag::MinimumInvestmentApplied));
    }

    #[test]
    fn ultra_large_lump_caps_volatile_classes() {
        let config = PolicyConfig::default();
        let outcome = adjust_allocation(
            &profile(5_000_000.0, 0.0, 5),
            RiskPreference::Growth,
            &config,
        );
        assert_outcome_invariants(&outcome, &config);
        assert!(outcome.mix.weight(AssetClass::Dynamic) <= 5.0 + 0.1);
        assert!(outcome.mix.weight(AssetClass::Crypto) <= 0.1);
        assert!(has_warning(&outcome, WarningTag::LumpScalingApplied));
    }

    #[test]
    fn large_monthly_contribution_triggers_monthly_tier() {
        let config = PolicyConfig::default();
        let outcome = adjust_allocation(
            &profile(0.0, 6_000.0, 15),
            RiskPreference::Growth,
            &config,
        );
        assert_outcome_invariants(&outcome, &config);
        assert!(outcome.mix.weight(AssetClass::Dynamic) <= 10.0 + 0.1);
        assert!(outcome.mix.weight(AssetClass::Crypto) <= 3.0 + 0.1);
        assert!(has_warning(&outcome, WarningTag::MonthlyScalingApplied));
    }

    #[test]
    fn lump_tier_keeps_dynamic_capped_through_later_passes() {
        // The tightened caps persist, so neither the tuner nor the
        // optimizer may re-inflate a scaled-down class.
        let config = PolicyConfig::default();
        let outcome = adjust_allocation(
            &profile(600_000.0, 0.0, 10),
            RiskPreference::Balanced,
            &config,
        );
        assert_outcome_invariants(&outcome, &config);
        assert!(outcome.mix.weight(AssetClass::Dynamic) <= 8.0 + 0.1);
        assert!(outcome.mix.weight(AssetClass::Crypto) <= 2.0 + 0.1);
        assert!(has_warning(&outcome, WarningTag::LumpScalingApplied));
    }

    #[test]
    fn zero_profile_returns_compliant_mix() {
        let config = PolicyConfig::default();
        for preference in RiskPreference::ALL {
            let outcome = adjust_allocation(&profile(0.0, 0.0, 0), preference, &config);
            assert_outcome_invariants(&outcome, &config);
            assert!(outcome.metrics.expected_yield_annual.is_finite());
            assert!(outcome.metrics.risk_score.is_finite());
        }
    }

    #[test]
    fn zero_profile_reports_minimum_and_tuner_warnings() {
        let config = PolicyConfig::default();
        let balanced = adjust_allocation(
            &profile(0.0, 0.0, 0),
            RiskPreference::Balanced,
            &config,
        );
        assert!(has_warning(&balanced, WarningTag::MinimumInvestmentApplied));

        // With no plan volume the growth pipeline runs out of cap room
        // before reaching its target band.
        let growth = adjust_allocation(&profile(0.0, 0.0, 0), RiskPreference::Growth, &config);
        assert!(has_warning(&growth, WarningTag::RiskTargetLimited));
    }

    #[test]
    fn pipeline_is_idempotent_on_compliant_outcomes() {
        let config = PolicyConfig::default();
        let cases = [
            (profile(0.0, 600.0, 20), RiskPreference::Balanced),
            (profile(10_000.0, 300.0, 30), RiskPreference::Growth),
            (profile(10_000.0, 300.0, 30), RiskPreference::Conservative),
            (profile(2_489.0, 51.0, 10), RiskPreference::Balanced),
        ];
        for (input, preference) in cases {
            let first = adjust_allocation(&input, preference, &config);
            let second = adjust_allocation_from(&input, preference, first.mix, &config);
            for class in AssetClass::ALL {
                let delta = (first.mix.weight(class) - second.mix.weight(class)).abs();
                assert!(
                    delta <= 0.1,
                    "{preference:?}/{class:?} drifted by {delta} on re-run"
                );
            }
        }
    }

    #[test]
    fn gold_allocation_is_inverted_across_preferences() {
        let config = PolicyConfig::default();
        let inputs = [
            profile(0.0, 600.0, 20),
            profile(10_000.0, 300.0, 30),
            profile(45_800.0, 200.0, 30),
            profile(2_489.0, 51.0, 10),
            profile(500_000.0, 0.0, 10),
        ];
        for input in inputs {
            let cons = adjust_allocation(&input, RiskPreference::Conservative, &config);
            let bal = adjust_allocation(&input, RiskPreference::Balanced, &config);
            let growth = adjust_allocation(&input, RiskPreference::Growth, &config);
            let g_cons = cons.mix.weight(AssetClass::Gold);
            let g_bal = bal.mix.weight(AssetClass::Gold);
            let g_growth = growth.mix.weight(AssetClass::Gold);
            assert!(
                g_cons >= g_bal - 1e-6 && g_bal >= g_growth - 1e-6,
                "gold inversion violated: {g_cons} / {g_bal} / {g_growth}"
            );
        }
    }

    #[test]
    fn down_tuner_converges_to_a_reduced_budget() {
        let mut config = PolicyConfig::default();
        config.risk_budgets = [2.0, 3.0, 4.0];
        let outcome = adjust_allocation(
            &profile(60_000.0, 0.0, 0),
            RiskPreference::Conservative,
            &config,
        );
        assert!(outcome.metrics.rounds.tuner_steps > 0);
        assert!(
            outcome.metrics.risk_score <= 2.0 + config.risk_tolerance + 1e-6,
            "risk {} did not converge to the reduced budget",
            outcome.metrics.risk_score
        );
        assert_outcome_invariants(&outcome, &config);
    }

    #[test]
    fn up_tuner_stops_at_the_per_profile_ceiling() {
        let config = PolicyConfig::default();
        // A 30k early-stage conservative plan sits well below its band;
        // the 6pp ceiling binds before the band is reached.
        let outcome = adjust_allocation(
            &profile(30_000.0, 0.0, 0),
            RiskPreference::Conservative,
            &config,
        );
        assert_eq!(outcome.metrics.rounds.tuner_steps, 12);
        assert!(has_warning(&outcome, WarningTag::RiskTargetLimited));
        assert!(outcome.metrics.risk_score > 2.95);
        assert_outcome_invariants(&outcome, &config);
    }

    #[test]
    fn cash_floor_holds_through_the_tuner() {
        let config = PolicyConfig::default();
        let input = Profile {
            lump_sum_eur: 0.0,
            monthly_eur: 500.0,
            horizon_years: 10,
            monthly_income_eur: 0.0,
            fixed_expenses_eur: 1_000.0,
            variable_expenses_eur: 500.0,
            reserve_eur: 2_000.0,
            reserve_months: 6,
            goal_assets_eur: None,
        };
        let outcome = adjust_allocation(&input, RiskPreference::Balanced, &config);
        assert_outcome_invariants(&outcome, &config);
        assert!(has_warning(&outcome, WarningTag::CashFloorApplied));
        assert!(
            outcome.mix.weight(AssetClass::Cash) >= 10.0 - 0.1,
            "cash {} fell below the emergency floor",
            outcome.mix.weight(AssetClass::Cash)
        );
    }

    #[test]
    fn funded_reserve_leaves_cash_untouched() {
        let config = PolicyConfig::default();
        let input = Profile {
            lump_sum_eur: 0.0,
            monthly_eur: 500.0,
            horizon_years: 10,
            monthly_income_eur: 0.0,
            fixed_expenses_eur: 1_000.0,
            variable_expenses_eur: 500.0,
            reserve_eur: 9_000.0,
            reserve_months: 6,
            goal_assets_eur: None,
        };
        let outcome = adjust_allocation(&input, RiskPreference::Balanced, &config);
        assert!(!has_warning(&outcome, WarningTag::CashFloorApplied));
    }

    fn test_context(
        preference: RiskPreference,
        stage: Stage,
        volume: f64,
        config: &PolicyConfig,
    ) -> PassContext<'_> {
        PassContext {
            profile: profile(volume, 0.0, 0).sanitized(),
            preference,
            stage,
            caps: cap_set(preference, stage, config),
            budget: risk_budget(preference, stage, config),
            volume,
            cash_floor_pct: 0.0,
            config,
        }
    }

    #[test]
    fn cap_enforcement_clamps_combo_with_seventy_thirty_split() {
        let config = PolicyConfig::default();
        let ctx = test_context(RiskPreference::Balanced, Stage::Core, 60_000.0, &config);
        let mut mix = Mix::zero();
        mix.set_weight(AssetClass::Dynamic, 40.0);
        mix.set_weight(AssetClass::Crypto, 40.0);
        mix.set_weight(AssetClass::Cash, 20.0);

        enforce_caps(&mut mix, &ctx);

        assert!((mix.total() - 100.0).abs() < 1e-6);
        assert!(mix.weight(AssetClass::Dynamic) <= ctx.caps.cap(AssetClass::Dynamic) + 1e-6);
        assert!(mix.weight(AssetClass::Crypto) <= ctx.caps.cap(AssetClass::Crypto) + 1e-6);
        let combo = mix.weight(AssetClass::Dynamic) + mix.weight(AssetClass::Crypto);
        assert!(combo <= ctx.caps.combo_cap() + 1e-6);
        // Overflow lands in equity first for core stage.
        assert!(mix.weight(AssetClass::Equity) > 50.0);
    }

    #[test]
    fn late_stage_overflow_prefers_bonds_over_equity() {
        let config = PolicyConfig::default();
        let ctx = test_context(RiskPreference::Conservative, Stage::Late, 200_000.0, &config);
        let mut mix = Mix::zero();
        mix.set_weight(AssetClass::Equity, 60.0);
        mix.set_weight(AssetClass::GovBonds, 20.0);
        mix.set_weight(AssetClass::CorpBonds, 20.0);

        enforce_caps(&mut mix, &ctx);

        // Equity clamps to the late cap of 30; the overflow fills the bond
        // tranches before anything else.
        assert!(mix.weight(AssetClass::Equity) <= 30.0 + 1e-6);
        assert!(mix.weight(AssetClass::GovBonds) > 20.0);
        assert!((mix.total() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn risk_cap_rounds_cut_riskiest_class_into_bond_sinks() {
        let mut config = PolicyConfig::default();
        config.risk_budgets = [1.0, 1.0, 1.0];
        let ctx = test_context(RiskPreference::Conservative, Stage::Core, 500_000.0, &config);
        let mut mix = Mix::zero();
        mix.set_weight(AssetClass::Equity, 100.0);
        let initial_risk = ctx.risk(&mix);

        let mut warnings = WarningLog::new();
        let mut rounds = PassRounds::default();
        enforce_risk_cap(&mut mix, &ctx, &mut warnings, &mut rounds);

        let warnings = warnings.into_vec();
        assert!(warnings.iter().any(|w| w.tag == WarningTag::RiskCapEnforced));
        assert!(ctx.risk(&mix) < initial_risk);
        assert!(rounds.risk_cap_rounds >= 8);
        assert!((mix.total() - 100.0).abs() < 1e-6);
        // The budget of 1.0 is unreachable; the residual is reported, not
        // swallowed.
        assert!(
            warnings
                .iter()
                .any(|w| w.tag == WarningTag::ResidualRiskAboveBudget)
        );
    }

    #[test]
    fn direct_cut_halves_high_risk_classes_into_bonds_only() {
        let mut config = PolicyConfig::default();
        config.risk_budgets = [2.5, 2.5, 2.5];
        config.direct_cut_after_round = 0;
        let ctx = test_context(RiskPreference::Conservative, Stage::Core, 500_000.0, &config);
        let mut mix = Mix::zero();
        mix.set_weight(AssetClass::Equity, 100.0);

        let mut warnings = WarningLog::new();
        let mut rounds = PassRounds::default();
        enforce_risk_cap(&mut mix, &ctx, &mut warnings, &mut rounds);

        // Two direct-cut rounds saturate the tranches; equity is halved
        // each time and gold/cash receive nothing.
        assert!(mix.weight(AssetClass::Equity) <= 25.0 + 1e-6);
        assert!(mix.weight(AssetClass::GovBonds) > 0.0);
        assert!(mix.weight(AssetClass::CorpBonds) > 0.0);
        assert_eq!(mix.weight(AssetClass::Gold), 0.0);
        assert_eq!(mix.weight(AssetClass::Cash), 0.0);
        assert!((mix.total() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn optimizer_boosts_yield_within_risk_headroom() {
        let config = PolicyConfig::default();
        let input = profile(10_000.0, 300.0, 30);
        let outcome = adjust_allocation(&input, RiskPreference::Growth, &config);
        assert!(outcome.metrics.rounds.optimizer_moves > 0);
        assert!(
            outcome.metrics.risk_score
                <= outcome.metrics.risk_budget + config.optimizer_headroom + 1e-6
        );
        assert!(!has_warning(&outcome, WarningTag::YieldBoostLimited));
    }

    #[test]
    fn optimizer_respects_cumulative_boost_ceiling() {
        let mut config = PolicyConfig::default();
        config.yield_boost_ceiling_pct = [0.0, 0.0, 0.05];
        let input = profile(10_000.0, 300.0, 30);
        let outcome = adjust_allocation(&input, RiskPreference::Growth, &config);
        assert_eq!(outcome.metrics.rounds.optimizer_moves, 0);
        assert!(has_warning(&outcome, WarningTag::YieldBoostLimited));
    }

    #[test]
    fn optimizer_skips_small_plans() {
        let mut config = PolicyConfig::default();
        config.optimizer_min_volume_eur = 1_000_000.0;
        let input = profile(10_000.0, 300.0, 30);
        let outcome = adjust_allocation(&input, RiskPreference::Growth, &config);
        assert_eq!(outcome.metrics.rounds.optimizer_moves, 0);
    }

    #[test]
    fn bond_floor_tops_up_conservative_bonds() {
        let config = PolicyConfig::default();
        let ctx = test_context(RiskPreference::Conservative, Stage::Core, 60_000.0, &config);
        let mut mix = Mix::zero();
        mix.set_weight(AssetClass::Equity, 70.0);
        mix.set_weight(AssetClass::Gold, 20.0);
        mix.set_weight(AssetClass::Cash, 10.0);

        let mut warnings = WarningLog::new();
        apply_bond_floor(&mut mix, &ctx, &mut warnings);

        let bonds = mix.weight(AssetClass::GovBonds) + mix.weight(AssetClass::CorpBonds);
        assert!((bonds - 20.0).abs() < 1e-6);
        assert!((mix.total() - 100.0).abs() < 1e-6);
        assert!(
            warnings
                .into_vec()
                .iter()
                .any(|w| w.tag == WarningTag::BondFloorApplied)
        );
    }

    #[test]
    fn bond_floor_skips_plans_below_bond_minimums() {
        let config = PolicyConfig::default();
        let ctx = test_context(RiskPreference::Conservative, Stage::Early, 8_000.0, &config);
        let mut mix = Mix::zero();
        mix.set_weight(AssetClass::Equity, 80.0);
        mix.set_weight(AssetClass::Gold, 20.0);

        let mut warnings = WarningLog::new();
        apply_bond_floor(&mut mix, &ctx, &mut warnings);

        assert_eq!(mix.weight(AssetClass::GovBonds), 0.0);
        assert!(warnings.into_vec().is_empty());
    }

    #[test]
    fn minimum_investment_redistribution_respects_gold_hard_cap() {
        let config = PolicyConfig::default();
        let ctx = test_context(RiskPreference::Conservative, Stage::Early, 0.0, &config);
        let mut mix = base_mix(RiskPreference::Conservative);

        let mut warnings = WarningLog::new();
        apply_minimum_investment(&mut mix, &ctx, &mut warnings);

        assert!(
            mix.weight(AssetClass::Gold)
                <= config.gold_policy(RiskPreference::Conservative).hard_cap + 1e-6
        );
        assert_eq!(mix.weight(AssetClass::Dynamic), 0.0);
        assert_eq!(mix.weight(AssetClass::GovBonds), 0.0);
        assert_eq!(mix.weight(AssetClass::RealEstate), 0.0);
        assert!((mix.total() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn warning_log_deduplicates_by_tag() {
        let mut log = WarningLog::new();
        log.push(WarningTag::RiskTargetLimited, Some(1.0));
        log.push(WarningTag::RiskTargetLimited, Some(2.0));
        log.push(WarningTag::RiskCapEnforced, None);
        let entries = log.into_vec();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].context, Some(1.0));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_adjusted_mix_invariants_hold(
            lump in 0u32..2_000_000,
            monthly in 0u32..10_000,
            horizon in 0u32..41,
            income in 0u32..15_000,
            fixed in 0u32..4_000,
            variable in 0u32..3_000,
            reserve in 0u32..50_000,
            reserve_months in 0u32..12,
        ) {
            let config = PolicyConfig::default();
            let input = Profile {
                lump_sum_eur: lump as f64,
                monthly_eur: monthly as f64,
                horizon_years: horizon,
                monthly_income_eur: income as f64,
                fixed_expenses_eur: fixed as f64,
                variable_expenses_eur: variable as f64,
                reserve_eur: reserve as f64,
                reserve_months,
                goal_assets_eur: None,
            };

            for preference in RiskPreference::ALL {
                let outcome = adjust_allocation(&input, preference, &config);
                prop_assert!((outcome.mix.total() - 100.0).abs() <= 0.05);
                for class in AssetClass::ALL {
                    let weight = outcome.mix.weight(class);
                    prop_assert!(weight.is_finite());
                    prop_assert!(weight >= -1e-9);
                }
                prop_assert!(
                    outcome.metrics.risk_score <= outcome.metrics.risk_budget + 1.5
                );
                let combo = outcome.mix.weight(AssetClass::Dynamic)
                    + outcome.mix.weight(AssetClass::Crypto);
                prop_assert!(combo <= config.combo_caps[preference.index()] + 0.1);
                prop_assert!(
                    outcome.mix.weight(AssetClass::Gold)
                        <= config.gold_policy(preference).hard_cap + 0.1
                );
                prop_assert!(outcome.metrics.rounds.tuner_steps <= config.tuner_max_steps);
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(16))]

        #[test]
        fn prop_gold_inversion_holds(
            lump in 0u32..1_000_000,
            monthly in 0u32..5_000,
            horizon in 0u32..41,
        ) {
            let config = PolicyConfig::default();
            let input = profile(lump as f64, monthly as f64, horizon);
            let cons = adjust_allocation(&input, RiskPreference::Conservative, &config);
            let bal = adjust_allocation(&input, RiskPreference::Balanced, &config);
            let growth = adjust_allocation(&input, RiskPreference::Growth, &config);
            prop_assert!(
                cons.mix.weight(AssetClass::Gold) >= bal.mix.weight(AssetClass::Gold) - 1e-6
            );
            prop_assert!(
                bal.mix.weight(AssetClass::Gold) >= growth.mix.weight(AssetClass::Gold) - 1e-6
            );
        }
    }
}
