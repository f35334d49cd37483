use axum::{
    Router,
    extract::{Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AdjustmentWarning, AllocationOutcome, Metrics, MixEntry, PlanResult, PolicyConfig, Profile,
    RiskPreference, Stage, classify_stage, plan_all,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRiskPreference {
    Conservative,
    Balanced,
    Growth,
}

impl From<CliRiskPreference> for RiskPreference {
    fn from(value: CliRiskPreference) -> Self {
        match value {
            CliRiskPreference::Conservative => RiskPreference::Conservative,
            CliRiskPreference::Balanced => RiskPreference::Balanced,
            CliRiskPreference::Growth => RiskPreference::Growth,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRiskPreference {
    #[serde(alias = "defensive", alias = "safe")]
    Conservative,
    #[serde(alias = "moderate")]
    Balanced,
    #[serde(alias = "aggressive", alias = "offensive")]
    Growth,
}

impl From<ApiRiskPreference> for CliRiskPreference {
    fn from(value: ApiRiskPreference) -> Self {
        match value {
            ApiRiskPreference::Conservative => CliRiskPreference::Conservative,
            ApiRiskPreference::Balanced => CliRiskPreference::Balanced,
            ApiRiskPreference::Growth => CliRiskPreference::Growth,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    lump_sum: Option<f64>,
    monthly_contribution: Option<f64>,
    horizon_years: Option<u32>,
    monthly_income: Option<f64>,
    fixed_expenses: Option<f64>,
    variable_expenses: Option<f64>,
    reserve: Option<f64>,
    reserve_months: Option<u32>,
    goal_assets: Option<f64>,
    risk_preference: Option<ApiRiskPreference>,
}

#[derive(Parser, Debug)]
#[command(
    name = "folio",
    about = "Constrained portfolio allocation planner (stage-aware caps, risk budgets, yield tuning)"
)]
struct Cli {
    #[arg(long, default_value_t = 0.0, help = "One-time investment in EUR")]
    lump_sum: f64,
    #[arg(long, default_value_t = 0.0, help = "Monthly contribution in EUR")]
    monthly_contribution: f64,
    #[arg(long, default_value_t = 10, help = "Investment horizon in years")]
    horizon_years: u32,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Net monthly income in EUR; gates real-estate exposure"
    )]
    monthly_income: f64,
    #[arg(long, default_value_t = 0.0, help = "Fixed monthly expenses in EUR")]
    fixed_expenses: f64,
    #[arg(long, default_value_t = 0.0, help = "Variable monthly expenses in EUR")]
    variable_expenses: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Emergency reserve already held in EUR"
    )]
    reserve: f64,
    #[arg(
        long,
        default_value_t = 0,
        help = "Months of expenses the reserve should cover"
    )]
    reserve_months: u32,
    #[arg(long, help = "Target assets in EUR; refines the stage once covered")]
    goal_assets: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliRiskPreference::Balanced)]
    risk_preference: CliRiskPreference,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    preference: RiskPreference,
    mix: Vec<MixEntry>,
    warnings: Vec<AdjustmentWarning>,
    metrics: Metrics,
}

impl From<&AllocationOutcome> for ProfileResponse {
    fn from(outcome: &AllocationOutcome) -> Self {
        Self {
            preference: outcome.preference,
            mix: outcome.mix.entries(),
            warnings: outcome.warnings.clone(),
            metrics: outcome.metrics,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    selected_preference: RiskPreference,
    stage: Stage,
    effective_volume: f64,
    conservative: ProfileResponse,
    balanced: ProfileResponse,
    growth: ProfileResponse,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_profile(cli: &Cli) -> Result<Profile, String> {
    for (name, value) in [
        ("--lump-sum", cli.lump_sum),
        ("--monthly-contribution", cli.monthly_contribution),
        ("--monthly-income", cli.monthly_income),
        ("--fixed-expenses", cli.fixed_expenses),
        ("--variable-expenses", cli.variable_expenses),
        ("--reserve", cli.reserve),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be a finite value >= 0"));
        }
    }

    if cli.horizon_years > 100 {
        return Err("--horizon-years must be <= 100".to_string());
    }

    if cli.reserve_months > 600 {
        return Err("--reserve-months must be <= 600".to_string());
    }

    if let Some(goal) = cli.goal_assets {
        if !goal.is_finite() || goal <= 0.0 {
            return Err("--goal-assets must be a finite value > 0".to_string());
        }
    }

    Ok(Profile {
        lump_sum_eur: cli.lump_sum,
        monthly_eur: cli.monthly_contribution,
        horizon_years: cli.horizon_years,
        monthly_income_eur: cli.monthly_income,
        fixed_expenses_eur: cli.fixed_expenses,
        variable_expenses_eur: cli.variable_expenses,
        reserve_eur: cli.reserve,
        reserve_months: cli.reserve_months,
        goal_assets_eur: cli.goal_assets,
    })
}

fn cli_from_payload(payload: PlanPayload) -> Cli {
    let defaults = Cli::parse_from(["folio"]);
    Cli {
        lump_sum: payload.lump_sum.unwrap_or(defaults.lump_sum),
        monthly_contribution: payload
            .monthly_contribution
            .unwrap_or(defaults.monthly_contribution),
        horizon_years: payload.horizon_years.unwrap_or(defaults.horizon_years),
        monthly_income: payload.monthly_income.unwrap_or(defaults.monthly_income),
        fixed_expenses: payload.fixed_expenses.unwrap_or(defaults.fixed_expenses),
        variable_expenses: payload
            .variable_expenses
            .unwrap_or(defaults.variable_expenses),
        reserve: payload.reserve.unwrap_or(defaults.reserve),
        reserve_months: payload.reserve_months.unwrap_or(defaults.reserve_months),
        goal_assets: payload.goal_assets,
        risk_preference: payload
            .risk_preference
            .map(Into::into)
            .unwrap_or(defaults.risk_preference),
    }
}

fn build_plan_response(
    profile: &Profile,
    selected: RiskPreference,
    result: &PlanResult,
    config: &PolicyConfig,
) -> PlanResponse {
    let sanitized = profile.sanitized();
    PlanResponse {
        selected_preference: selected,
        stage: classify_stage(&sanitized, config),
        effective_volume: sanitized.effective_volume(),
        conservative: ProfileResponse::from(&result.conservative),
        balanced: ProfileResponse::from(&result.balanced),
        growth: ProfileResponse::from(&result.growth),
    }
}

fn plan_from_cli(cli: &Cli) -> Result<PlanResponse, String> {
    let profile = build_profile(cli)?;
    let config = PolicyConfig::default();
    let result = plan_all(&profile, &config);
    Ok(build_plan_response(
        &profile,
        cli.risk_preference.into(),
        &result,
        &config,
    ))
}

/// Parses CLI-style arguments and returns the plan as pretty JSON.
pub fn run_plan_cli(args: &[String]) -> Result<String, String> {
    let mut argv = vec!["folio".to_string()];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).map_err(|e| e.to_string())?;
    let response = plan_from_cli(&cli)?;
    serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
}

async fn plan_get_handler(Query(payload): Query<PlanPayload>) -> Response {
    plan_handler_impl(payload).await
}

async fn plan_post_handler(Json(payload): Json<PlanPayload>) -> Response {
    plan_handler_impl(payload).await
}

async fn plan_handler_impl(payload: PlanPayload) -> Response {
    let cli = cli_from_payload(payload);
    match plan_from_cli(&cli) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response(),
    }
}

async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not found".to_string(),
        }),
    )
        .into_response()
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "allocation planner API listening");
    println!("Local access: http://127.0.0.1:{port}/api/plan");

    axum::serve(listener, app).await
}
