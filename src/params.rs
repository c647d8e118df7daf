// src/params.rs

//! Parameter storage and `${...}` reference resolution.
//!
//! A [`ParameterStore`] maps parameter names to JSON values. String values
//! may reference other parameters with `${name}` and are resolved
//! recursively, so a parameter whose value is `"${other}"` follows the
//! chain. A `${name}` token whose name matches the date-expression pattern
//! (a format token followed by a signed day offset, e.g. `yyyy-MM-dd-1`) is
//! evaluated against the current date instead of the store.
//!
//! Resolution tracks the set of parameter names currently being expanded;
//! a parameter that references itself, directly or through a chain, fails
//! with [`Error::CyclicParameter`] instead of recursing forever.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::{Duration, Local, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use crate::errors::{Error, Result};

/// Matches one `${name}` reference. Braces do not nest.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("hard-coded regex"));

/// Matches a date expression: a format token (letters and hyphens) followed
/// by `+` or `-` and a day count, e.g. `yyyy-MM-dd-1` or `yyyyMMdd+7`.
static DATE_EXPR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z-]+)([+-])(\d+)$").expect("hard-coded regex"));

/// Translate a custom date-format token to strftime-style tokens.
///
/// The table is fixed: `yyyy -> %Y`, `MM -> %m`, `dd -> %d`, `HH -> %H`,
/// `mm -> %M`, `ss -> %S`. Anything else passes through literally.
pub fn convert_date_format(format: &str) -> String {
    const MAPPINGS: [(&str, &str); 6] = [
        ("yyyy", "%Y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];

    let mut out = format.to_string();
    for (token, strftime) in MAPPINGS {
        out = out.replace(token, strftime);
    }
    out
}

/// Evaluate a bare date expression such as `yyyy-MM-dd-1` against `reference`.
///
/// Returns `None` when `expr` is not a date expression, or when the offset
/// is too large to represent.
pub fn eval_date_expr_at(expr: &str, reference: NaiveDateTime) -> Option<String> {
    let caps = DATE_EXPR_RE.captures(expr)?;

    let days: i64 = caps[3].parse().ok()?;
    let delta = match &caps[2] {
        "-" => -days,
        _ => days,
    };

    let target = reference.checked_add_signed(Duration::try_days(delta)?)?;
    let format = convert_date_format(&caps[1]);
    Some(target.format(&format).to_string())
}

/// Evaluate a date expression against the current local time, returning the
/// input unchanged when it is not a date expression.
pub fn eval_date_expr(expr: &str) -> String {
    eval_date_expr_at(expr, Local::now().naive_local()).unwrap_or_else(|| expr.to_string())
}

/// Named parameter values with `${...}` resolution.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: BTreeMap<String, Value>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge parameters into the store. Later keys overwrite earlier ones.
    pub fn set<I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.params.extend(params);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Look up a parameter, falling back to `default` when absent.
    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.params.get(name).cloned().unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// A copy of the current parameter mapping, as recorded in run history.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.params.clone()
    }

    /// Resolve every `${name}` reference in `text`.
    ///
    /// Date expressions are evaluated against the current local time; known
    /// parameter names substitute their (recursively resolved) value;
    /// unknown names are left verbatim.
    pub fn resolve(&self, text: &str) -> Result<String> {
        self.resolve_at(text, Local::now().naive_local())
    }

    /// Like [`resolve`](Self::resolve), but date expressions are evaluated
    /// against `reference` instead of the wall clock. Backfill uses this to
    /// re-evaluate templates per logical date.
    pub fn resolve_at(&self, text: &str, reference: NaiveDateTime) -> Result<String> {
        let mut in_progress = HashSet::new();
        self.resolve_inner(text, reference, &mut in_progress)
    }

    fn resolve_inner(
        &self,
        text: &str,
        reference: NaiveDateTime,
        in_progress: &mut HashSet<String>,
    ) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in TOKEN_RE.captures_iter(text) {
            let token = &caps[0];
            let range = caps
                .get(0)
                .map(|m| m.range())
                .unwrap_or(last..last);

            out.push_str(&text[last..range.start]);
            out.push_str(&self.resolve_token(&caps[1], token, reference, in_progress)?);
            last = range.end;
        }

        out.push_str(&text[last..]);
        Ok(out)
    }

    fn resolve_token(
        &self,
        name: &str,
        token: &str,
        reference: NaiveDateTime,
        in_progress: &mut HashSet<String>,
    ) -> Result<String> {
        if let Some(formatted) = eval_date_expr_at(name, reference) {
            return Ok(formatted);
        }

        match self.params.get(name) {
            Some(Value::String(value)) => {
                if !in_progress.insert(name.to_string()) {
                    return Err(Error::CyclicParameter(name.to_string()));
                }
                let resolved = self.resolve_inner(value, reference, in_progress)?;
                in_progress.remove(name);
                Ok(resolved)
            }
            Some(other) => Ok(other.to_string()),
            // Unresolved references are not an error; leave the token as-is.
            None => Ok(token.to_string()),
        }
    }
}
