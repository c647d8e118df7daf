// src/backfill/mod.rs

//! Backfill planner: run the same workflow once per logical date.
//!
//! The planner expands a [`DateSpec`] into date points, builds a per-date
//! parameter bundle (multi-format date parameters, rewritten templates,
//! custom overrides), and drives one engine run per date against a fresh
//! graph from the [`GraphFactory`]. Date points are fully independent: a
//! failing date never blocks the ones after it.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::dag::DependencyGraph;
use crate::engine::{ExecutionEngine, RunOptions};
use crate::errors::Result;
use crate::params::{self, ParameterStore};

pub mod dates;

pub use dates::{DateSpec, Granularity};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

fn default_date_param_names() -> Vec<String> {
    vec!["day_id".to_string()]
}

/// What to backfill and how to parameterize each date point.
///
/// The serde field names mirror the backfill parameter files users feed the
/// tooling around this crate (`start_date`/`end_date`/`custom_dates` are
/// flattened into the same object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillOptions {
    #[serde(flatten)]
    pub dates: DateSpec,
    /// Parameter names to fill with the formatted date point.
    #[serde(default = "default_date_param_names")]
    pub date_param_names: Vec<String>,
    /// strftime-style format per date parameter name; `%Y-%m-%d` when absent.
    #[serde(default)]
    pub date_param_formats: BTreeMap<String, String>,
    /// Extra parameters merged last; they override date parameters.
    #[serde(default, rename = "params")]
    pub custom_params: BTreeMap<String, Value>,
    #[serde(default)]
    pub only_tasks: Option<Vec<String>>,
    #[serde(default)]
    pub start_from: Option<String>,
    /// Plan and log without executing anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Skip the confirmation gate.
    #[serde(default)]
    pub auto_confirm: bool,
}

impl BackfillOptions {
    pub fn new(dates: DateSpec) -> Self {
        Self {
            dates,
            date_param_names: default_date_param_names(),
            date_param_formats: BTreeMap::new(),
            custom_params: BTreeMap::new(),
            only_tasks: None,
            start_from: None,
            dry_run: false,
            auto_confirm: false,
        }
    }
}

/// One logical date with its formatted parameter bundle.
#[derive(Debug, Clone, Serialize)]
pub struct DatePoint {
    pub date: NaiveDate,
    /// Formatted value per configured date-parameter name, plus
    /// `<name>_no_dash` dash-stripped variants.
    pub params: BTreeMap<String, Value>,
}

impl DatePoint {
    fn build(date: NaiveDate, names: &[String], formats: &BTreeMap<String, String>) -> Self {
        let mut params = BTreeMap::new();

        for name in names {
            let format = formats
                .get(name)
                .map(String::as_str)
                .unwrap_or(DEFAULT_DATE_FORMAT);
            params.insert(name.clone(), Value::String(format_date(date, format, name)));
        }

        for name in names {
            let key = format!("{name}_no_dash");
            if params.contains_key(&key) {
                continue;
            }
            let stripped = match params.get(name) {
                Some(Value::String(value)) => value.replace('-', ""),
                _ => continue,
            };
            params.insert(key, Value::String(stripped));
        }

        Self { date, params }
    }
}

/// Format `date` with a user-supplied strftime format, falling back to the
/// default format when the format string is invalid.
fn format_date(date: NaiveDate, format: &str, name: &str) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    match write!(out, "{}", date.and_time(NaiveTime::MIN).format(format)) {
        Ok(()) => out,
        Err(_) => {
            warn!(
                param = %name,
                format = %format,
                "invalid date format; falling back to {DEFAULT_DATE_FORMAT}"
            );
            date.format(DEFAULT_DATE_FORMAT).to_string()
        }
    }
}

/// A fresh graph plus its declared workflow-level parameters.
///
/// Factories must hand out independent graphs: state mutated while running
/// one date point must never leak into another.
pub struct GraphTemplate {
    pub graph: DependencyGraph,
    /// Workflow-level parameters; a string value that is exactly a date
    /// expression token (e.g. `${yyyy-MM-dd-1}`) is re-evaluated against
    /// each logical date rather than the wall clock.
    pub template_params: BTreeMap<String, Value>,
}

pub trait GraphFactory {
    fn build(&self) -> Result<GraphTemplate>;
}

impl<F> GraphFactory for F
where
    F: Fn() -> Result<GraphTemplate>,
{
    fn build(&self) -> Result<GraphTemplate> {
        self()
    }
}

/// Plan summary shown to the confirmation gate before anything runs.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillPlan {
    pub dates: Vec<NaiveDate>,
    pub date_param_names: Vec<String>,
    pub only_tasks: Option<Vec<String>>,
    pub start_from: Option<String>,
}

/// Single yes/no gate consulted once before the date loop.
pub trait ConfirmGate: Send + Sync {
    fn confirm(&self, plan: &BackfillPlan) -> bool;
}

/// Interactive gate: prints the plan to stderr and reads y/n from stdin.
#[derive(Debug, Default)]
pub struct PromptConfirm;

impl ConfirmGate for PromptConfirm {
    fn confirm(&self, plan: &BackfillPlan) -> bool {
        if let (Some(first), Some(last)) = (plan.dates.first(), plan.dates.last()) {
            eprintln!(
                "About to backfill {} date point(s), {first} .. {last}.",
                plan.dates.len()
            );
        }
        if let Some(only) = &plan.only_tasks {
            eprintln!("Restricted to tasks: {}", only.join(", "));
        }
        if let Some(start) = &plan.start_from {
            eprintln!("Starting from task: {start}");
        }
        eprint!("Proceed? [y/N] ");

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Aggregated outcome of a backfill.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub planned: Vec<NaiveDate>,
    pub succeeded: usize,
    /// Date points whose run failed, in plan order.
    pub failed_dates: Vec<NaiveDate>,
    pub dry_run: bool,
    /// The confirmation gate declined the plan; nothing was executed.
    pub cancelled: bool,
}

impl BackfillReport {
    pub fn failed(&self) -> usize {
        self.failed_dates.len()
    }

    /// Overall success: confirmed and no failed date points.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_dates.is_empty()
    }
}

pub struct BackfillPlanner {
    engine: ExecutionEngine,
    confirm: Box<dyn ConfirmGate>,
}

impl Default for BackfillPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BackfillPlanner {
    pub fn new() -> Self {
        Self {
            engine: ExecutionEngine::new(),
            confirm: Box::new(PromptConfirm),
        }
    }

    /// Use a pre-configured engine (e.g. one carrying an alert sink).
    pub fn with_engine(mut self, engine: ExecutionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_confirm_gate(mut self, gate: Box<dyn ConfirmGate>) -> Self {
        self.confirm = gate;
        self
    }

    /// The engine driving the per-date runs; its history carries one record
    /// per executed date point, tagged with the date.
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Expand the date specification into the ordered list of date points.
    pub fn plan(&self, spec: &DateSpec) -> Result<Vec<NaiveDate>> {
        dates::expand(spec)
    }

    /// Run the backfill: one independent engine run per date point.
    ///
    /// A failing date point is recorded and the loop continues; only
    /// configuration errors (an invalid date range, a factory failure)
    /// abort the whole backfill.
    pub async fn run(
        &mut self,
        factory: &impl GraphFactory,
        opts: &BackfillOptions,
    ) -> Result<BackfillReport> {
        let planned = dates::expand(&opts.dates)?;

        let mut report = BackfillReport {
            planned: planned.clone(),
            succeeded: 0,
            failed_dates: Vec::new(),
            dry_run: opts.dry_run,
            cancelled: false,
        };

        if planned.is_empty() {
            warn!("backfill plan contains no date points");
            return Ok(report);
        }

        info!(
            count = planned.len(),
            first = %planned[0],
            last = %planned[planned.len() - 1],
            dry_run = opts.dry_run,
            "backfill plan expanded"
        );

        if !opts.dry_run && !opts.auto_confirm {
            let plan = BackfillPlan {
                dates: planned.clone(),
                date_param_names: opts.date_param_names.clone(),
                only_tasks: opts.only_tasks.clone(),
                start_from: opts.start_from.clone(),
            };
            if !self.confirm.confirm(&plan) {
                info!("backfill declined; nothing executed");
                report.cancelled = true;
                return Ok(report);
            }
        }

        for date in &planned {
            let point = DatePoint::build(*date, &opts.date_param_names, &opts.date_param_formats);
            let template = factory.build()?;
            let mut graph = template.graph;

            let mut merged = point.params;
            for (key, value) in template.template_params {
                match rewrite_template_param(&value, *date) {
                    Some(rendered) => {
                        if rendered.contains('-') {
                            merged.insert(
                                format!("{key}_no_dash"),
                                Value::String(rendered.replace('-', "")),
                            );
                        }
                        merged.insert(key, Value::String(rendered));
                    }
                    None => {
                        merged.insert(key, value);
                    }
                }
            }
            merged.extend(opts.custom_params.clone());

            if opts.dry_run {
                info!(date = %date, params = ?merged, "dry-run; skipping execution");
                continue;
            }

            let mut store = ParameterStore::new();
            store.set(merged);

            let run_opts = RunOptions {
                start_from: opts.start_from.clone(),
                end_at: None,
                only_tasks: opts.only_tasks.clone(),
                fail_fast: true,
                date_point: Some(*date),
            };

            match self.engine.execute(&mut graph, &store, &run_opts).await {
                Ok(_) => {
                    report.succeeded += 1;
                    info!(date = %date, "backfill date point succeeded");
                }
                Err(err) => {
                    warn!(date = %date, error = %err, "backfill date point failed; continuing");
                    report.failed_dates.push(*date);
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "backfill finished"
        );

        Ok(report)
    }
}

/// Re-evaluate a workflow-level template value against a logical date.
///
/// Only values that are exactly one `${...}` token whose name is a date
/// expression are rewritten; anything else is kept for normal store
/// resolution.
fn rewrite_template_param(value: &Value, date: NaiveDate) -> Option<String> {
    let Value::String(text) = value else {
        return None;
    };
    let expr = text.strip_prefix("${")?.strip_suffix('}')?;
    params::eval_date_expr_at(expr, date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_point_bundle_formats_and_strips_dashes() {
        let names = vec!["day_id".to_string(), "batch_date".to_string()];
        let formats = BTreeMap::from([("batch_date".to_string(), "%Y%m%d".to_string())]);

        let point = DatePoint::build(date(2024, 7, 1), &names, &formats);

        assert_eq!(point.params["day_id"], json!("2024-07-01"));
        assert_eq!(point.params["day_id_no_dash"], json!("20240701"));
        assert_eq!(point.params["batch_date"], json!("20240701"));
        // Already dash-free; the variant is just the same string.
        assert_eq!(point.params["batch_date_no_dash"], json!("20240701"));
    }

    #[test]
    fn invalid_format_falls_back_to_default() {
        let names = vec!["day_id".to_string()];
        let formats = BTreeMap::from([("day_id".to_string(), "%Q".to_string())]);

        let point = DatePoint::build(date(2024, 7, 1), &names, &formats);
        assert_eq!(point.params["day_id"], json!("2024-07-01"));
    }

    #[test]
    fn template_rewrite_applies_offset_to_the_logical_date() {
        let rendered = rewrite_template_param(&json!("${yyyy-MM-dd-1}"), date(2024, 7, 10));
        assert_eq!(rendered.as_deref(), Some("2024-07-09"));
    }

    #[test]
    fn template_rewrite_ignores_plain_references() {
        assert_eq!(rewrite_template_param(&json!("${day_id}"), date(2024, 7, 10)), None);
        assert_eq!(rewrite_template_param(&json!("no token"), date(2024, 7, 10)), None);
        assert_eq!(rewrite_template_param(&json!(42), date(2024, 7, 10)), None);
    }

    #[test]
    fn options_deserialize_from_flat_params_object() {
        let opts: BackfillOptions = serde_json::from_str(
            r#"{
                "start_date": "2024-01-01",
                "end_date": "2024-01-03",
                "date_param_names": ["day_id", "batch_date"],
                "date_param_formats": {"batch_date": "%Y%m%d"},
                "params": {"region": "eu"},
                "dry_run": true
            }"#,
        )
        .unwrap();

        assert!(opts.dry_run);
        assert!(!opts.auto_confirm);
        assert_eq!(opts.date_param_names.len(), 2);
        assert_eq!(opts.custom_params["region"], json!("eu"));
    }
}
