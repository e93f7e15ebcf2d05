//! Run-time context for a single workflow execution.
//!
//! `RunContext` starts from the caller's variables and gains one entry per
//! successful step, keyed by step name. Parameter substitution and condition
//! evaluation both read from it.

use runbook_types::workflow::Params;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    vars: Params,
}

impl RunContext {
    pub fn new(vars: Params) -> Self {
        Self { vars }
    }

    /// Look up a top-level variable by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Insert or replace a variable.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Walk a dotted path: the first segment is a variable, the rest are
    /// object keys.
    pub fn lookup_path<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.vars.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Resolve a `$`-less reference: exact key first, then as a dotted path.
    pub fn resolve(&self, reference: &str) -> Option<&Value> {
        if let Some(value) = self.vars.get(reference) {
            return Some(value);
        }
        if reference.contains('.') {
            let segments: Vec<&str> = reference.split('.').collect();
            return self.lookup_path(&segments);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> RunContext {
        match value {
            Value::Object(map) => RunContext::new(map),
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut c = RunContext::default();
        c.insert("a", json!(1));
        c.insert("a", json!(2));
        assert_eq!(c.get("a"), Some(&json!(2)));
    }

    #[test]
    fn lookup_path_walks_objects() {
        let c = ctx(json!({"fetch": {"body": {"status": "ok"}}}));
        assert_eq!(
            c.lookup_path(&["fetch", "body", "status"]),
            Some(&json!("ok"))
        );
        assert!(c.lookup_path(&["fetch", "missing"]).is_none());
        assert!(c.lookup_path::<&str>(&[]).is_none());
    }

    #[test]
    fn lookup_path_stops_at_scalars() {
        let c = ctx(json!({"n": 3}));
        assert!(c.lookup_path(&["n", "x"]).is_none());
    }

    #[test]
    fn resolve_prefers_exact_key() {
        let c = ctx(json!({"a.b": "literal", "a": {"b": "nested"}}));
        assert_eq!(c.resolve("a.b"), Some(&json!("literal")));

        let c = ctx(json!({"a": {"b": "nested"}}));
        assert_eq!(c.resolve("a.b"), Some(&json!("nested")));
        assert!(c.resolve("zzz").is_none());
    }
}
