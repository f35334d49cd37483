use super::params::{PolicyConfig, asset_params};
use super::types::{AssetClass, Mix, RiskPreference};

/// Weighted expected annual return of a mix, in percent.
pub fn expected_yield(mix: &Mix, preference: RiskPreference) -> f64 {
    let params = asset_params(preference);
    AssetClass::ALL
        .into_iter()
        .map(|class| mix.weight(class) / 100.0 * params[class.index()].expected_return)
        .sum()
}

/// Composite 0-10 risk score. When the combined dynamic + crypto weight
/// exceeds the concentration threshold, those two classes contribute at
/// an elevated score before summing.
pub fn composite_risk(mix: &Mix, preference: RiskPreference, config: &PolicyConfig) -> f64 {
    let params = asset_params(preference);
    let combo = mix.weight(AssetClass::Dynamic) + mix.weight(AssetClass::Crypto);
    let biased = combo > config.combo_bias_threshold;

    let score: f64 = AssetClass::ALL
        .into_iter()
        .map(|class| {
            let mut risk = params[class.index()].risk_score;
            if biased && matches!(class, AssetClass::Dynamic | AssetClass::Crypto) {
                risk += config.combo_bias;
            }
            mix.weight(class) / 100.0 * risk
        })
        .sum();

    score.clamp(0.0, 10.0)
}
