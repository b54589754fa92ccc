//! Render context: the mapping a template is evaluated against, plus the
//! local-binding scope stack `{% for %}` introduces. Grounded on the
//! teacher's `ExpressionContext`/`minimal()` idiom, generalized to the
//! template renderer's fixed root set (§4.4): `$id`, `$input`, `$nodes`,
//! `$env`, `$vars`, `$workflow`, `$execution`.

use prana_workflow::Value;
use serde_json::Map;
use std::collections::HashMap;

/// Context a template is rendered against: a set of named `$`-roots plus a
/// stack of local scopes for loop-bound identifiers (`{% for ident in ... %}`).
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    roots: Map<String, Value>,
    locals: Vec<HashMap<String, Value>>,
}

impl RenderContext {
    pub fn new(roots: Map<String, Value>) -> Self {
        Self {
            roots,
            locals: Vec::new(),
        }
    }

    /// A context with no roots bound, for rendering literal-only templates
    /// or running filter/operator unit tests.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn root(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }

    pub fn set_root(&mut self, name: impl Into<String>, value: Value) {
        self.roots.insert(name.into(), value);
    }

    /// Resolve a bare (non-`$`) identifier from the innermost local scope
    /// outward.
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push_scope(&mut self, bindings: HashMap<String, Value>) {
        self.locals.push(bindings);
    }

    pub fn pop_scope(&mut self) {
        self.locals.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_scope_shadows_outer_scope() {
        let mut ctx = RenderContext::empty();
        ctx.push_scope(HashMap::from([("x".to_string(), json!(1))]));
        ctx.push_scope(HashMap::from([("x".to_string(), json!(2))]));
        assert_eq!(ctx.local("x"), Some(&json!(2)));
        ctx.pop_scope();
        assert_eq!(ctx.local("x"), Some(&json!(1)));
    }
}
