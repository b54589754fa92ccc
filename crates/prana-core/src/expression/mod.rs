//! §4.1/§4.2: the expression engine (`extract`) and the template renderer
//! (`{{ }}` / `{% if %}` / `{% for %}`), wired together behind
//! `TemplateRenderer`. Grounded on the teacher's `ExpressionEngine` facade,
//! which likewise exposes a single render entry point backed by a
//! lexer/parser/evaluator split.

pub mod context;
pub mod evaluator;
pub mod filters;
pub mod parser;
pub mod path;

pub use context::RenderContext;
pub use evaluator::{LimitKind, RenderError, RenderLimits};
pub use path::{extract, PathError};

use parser::{parse_template_with_limits, Expr, TemplateNode};
use prana_workflow::Value;

/// Host-overridable security limits (§4.2). Defaults match the spec's
/// fixed ceilings: 100,000 bytes of template source, 50 levels of
/// `{% if %}`/`{% for %}` nesting, 10,000 loop iterations, 100 levels of
/// expression recursion.
#[derive(Debug, Clone, Copy)]
pub struct TemplateLimits {
    pub max_template_bytes: usize,
    pub max_control_nesting: u32,
    pub max_loop_iterations: u64,
    pub max_expr_recursion: u32,
}

impl Default for TemplateLimits {
    fn default() -> Self {
        Self {
            max_template_bytes: 100_000,
            max_control_nesting: 50,
            max_loop_iterations: 10_000,
            max_expr_recursion: 100,
        }
    }
}

/// A template parsed once, ready to be rendered against many contexts.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    nodes: Vec<TemplateNode>,
}

/// Whether a single-block template (`"{{ $input.x }}"` and nothing else)
/// collapses to that one `Expr`, so rendering can preserve its type instead
/// of stringifying it.
fn as_single_expr(nodes: &[TemplateNode]) -> Option<(&Expr, &str)> {
    match nodes {
        [TemplateNode::Expr {
            raw,
            parsed: Ok(expr),
        }] => Some((expr, raw.as_str())),
        _ => None,
    }
}

/// Render `template` against `ctx`. Graceful mode re-emits unparseable or
/// unevaluable `{{ }}` blocks verbatim; security-limit and filter errors
/// always propagate regardless of mode.
pub fn render(
    template: &str,
    ctx: &mut RenderContext,
    limits: &TemplateLimits,
    graceful: bool,
) -> Result<Value, RenderError> {
    if template.len() > limits.max_template_bytes {
        return Err(RenderError::LimitExceeded(LimitKind::Size));
    }
    let nodes = parse_template_with_limits(
        template,
        limits.max_control_nesting,
        limits.max_expr_recursion,
    )
    .map_err(|e| RenderError::Parse(e.0))?;
    render_nodes(&nodes, ctx, limits, graceful)
}

/// Parse `template` once for reuse across many `render_compiled` calls.
pub fn compile(template: &str, limits: &TemplateLimits) -> Result<CompiledTemplate, RenderError> {
    if template.len() > limits.max_template_bytes {
        return Err(RenderError::LimitExceeded(LimitKind::Size));
    }
    let nodes = parse_template_with_limits(
        template,
        limits.max_control_nesting,
        limits.max_expr_recursion,
    )
    .map_err(|e| RenderError::Parse(e.0))?;
    Ok(CompiledTemplate { nodes })
}

pub fn render_compiled(
    compiled: &CompiledTemplate,
    ctx: &mut RenderContext,
    limits: &TemplateLimits,
    graceful: bool,
) -> Result<Value, RenderError> {
    render_nodes(&compiled.nodes, ctx, limits, graceful)
}

fn render_nodes(
    nodes: &[TemplateNode],
    ctx: &mut RenderContext,
    limits: &TemplateLimits,
    graceful: bool,
) -> Result<Value, RenderError> {
    let render_limits = RenderLimits {
        max_loop_iterations: limits.max_loop_iterations,
    };
    if let Some((expr, raw)) = as_single_expr(nodes) {
        return evaluator::render_single_expr(expr, raw, ctx, graceful);
    }
    evaluator::render_nodes_to_string(nodes, ctx, graceful, &render_limits).map(Value::String)
}

/// Recursively render every string leaf of a JSON-like tree (node param
/// maps, typically), preserving its shape. Non-string leaves pass through
/// unchanged.
pub fn process_map(
    value: &Value,
    ctx: &mut RenderContext,
    limits: &TemplateLimits,
    graceful: bool,
) -> Result<Value, RenderError> {
    match value {
        Value::String(s) => render(s, ctx, limits, graceful),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(process_map(item, ctx, limits, graceful)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), process_map(v, ctx, limits, graceful)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(root: &str, value: Value) -> RenderContext {
        let mut map = serde_json::Map::new();
        map.insert(root.to_string(), value);
        RenderContext::new(map)
    }

    #[test]
    fn single_expr_template_preserves_type() {
        let mut ctx = ctx_with("input", json!({"count": 3}));
        let result = render("{{ $input.count }}", &mut ctx, &TemplateLimits::default(), true).unwrap();
        assert_eq!(result, json!(3));
    }

    #[test]
    fn mixed_template_stringifies() {
        let mut ctx = ctx_with("input", json!({"count": 3}));
        let result = render(
            "count={{ $input.count }}",
            &mut ctx,
            &TemplateLimits::default(),
            true,
        )
        .unwrap();
        assert_eq!(result, json!("count=3"));
    }

    #[test]
    fn oversized_template_always_errors() {
        let huge = "a".repeat(200_000);
        let mut ctx = RenderContext::empty();
        let err = render(&huge, &mut ctx, &TemplateLimits::default(), true).unwrap_err();
        assert_eq!(err, RenderError::LimitExceeded(LimitKind::Size));
    }

    #[test]
    fn process_map_renders_nested_string_leaves() {
        let mut ctx = ctx_with("input", json!({"name": "Ada"}));
        let mapping = json!({"greeting": "hi {{ $input.name }}", "count": 1});
        let rendered = process_map(&mapping, &mut ctx, &TemplateLimits::default(), true).unwrap();
        assert_eq!(rendered["greeting"], json!("hi Ada"));
        assert_eq!(rendered["count"], json!(1));
    }

    #[test]
    fn compile_then_render_compiled_reuses_ast() {
        let compiled = compile("{{ $input.count }}", &TemplateLimits::default()).unwrap();
        let mut ctx = ctx_with("input", json!({"count": 7}));
        let result = render_compiled(&compiled, &mut ctx, &TemplateLimits::default(), true).unwrap();
        assert_eq!(result, json!(7));
    }
}
