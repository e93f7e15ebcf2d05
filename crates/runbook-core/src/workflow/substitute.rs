//! `$variable` substitution for step parameters.

use runbook_types::workflow::Params;
use serde_json::Value;

use super::context::RunContext;

/// Resolve `$name` references in `params` against the run context.
///
/// A string value starting with `$` is replaced by the context entry named
/// by the rest of the string, or kept literally when there is none. Nested
/// objects are resolved recursively. Every other value is copied as-is and
/// key order is preserved.
pub fn substitute_params(params: &Params, context: &RunContext) -> Params {
    params
        .iter()
        .map(|(key, value)| (key.clone(), substitute_value(value, context)))
        .collect()
}

fn substitute_value(value: &Value, context: &RunContext) -> Value {
    match value {
        Value::String(s) => match s.strip_prefix('$') {
            Some(name) => context.get(name).cloned().unwrap_or_else(|| value.clone()),
            None => value.clone(),
        },
        Value::Object(map) => Value::Object(substitute_params(map, context)),
        other => other.clone(),
    }
}
