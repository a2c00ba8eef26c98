//! Template renderer: turns manifest chunks into prompt text.
//!
//! Two placeholder kinds are recognized:
//! - `{component.<block>}`: replaced by the named block, recursively
//! - `{<variable>}`: replaced by the bound runtime value
//!
//! Block resolution runs first and tracks the chain of blocks being
//! expanded. A block that appears twice in one chain is a cycle: the
//! reference stays as literal text. A depth ceiling bounds nesting
//! independently. Neither condition fails the render.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use tracing::{debug, warn};

use crate::manifest::Chunk;

/// Default ceiling on nested block expansion.
pub const DEFAULT_MAX_DEPTH: usize = 50;

static BLOCK_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{component\.([A-Za-z0-9_\-]+)\}").expect("block pattern is valid")
});

static VARIABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
});

/// Variable bindings supplied at runtime.
pub type Bindings = serde_json::Map<String, serde_json::Value>;

/// Renders chunks against a block table and variable bindings.
pub struct TemplateRenderer<'a> {
    blocks: &'a BTreeMap<String, String>,
    max_depth: usize,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(blocks: &'a BTreeMap<String, String>) -> Self {
        Self {
            blocks,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the nesting ceiling.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Render an ordered list of chunks, joined by a blank line.
    pub fn render(&self, chunks: &[Chunk], bindings: &Bindings) -> String {
        chunks
            .iter()
            .map(|chunk| self.render_text(&chunk.content, bindings))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render a single piece of text.
    pub fn render_text(&self, text: &str, bindings: &Bindings) -> String {
        let mut chain = Vec::new();
        let expanded = self.expand_blocks(text, &mut chain, 0);
        substitute_variables(&expanded, bindings)
    }

    fn expand_blocks(&self, text: &str, chain: &mut Vec<String>, depth: usize) -> String {
        if !BLOCK_REF.is_match(text) {
            return text.to_string();
        }
        if depth >= self.max_depth {
            warn!(
                depth,
                max_depth = self.max_depth,
                "Block nesting limit reached, leaving references unresolved"
            );
            return text.to_string();
        }

        BLOCK_REF
            .replace_all(text, |caps: &Captures<'_>| {
                let name = &caps[1];
                if chain.iter().any(|seen| seen == name) {
                    warn!(
                        block = name,
                        chain = %chain.join(" -> "),
                        "Block reference cycle detected, leaving reference unresolved"
                    );
                    return caps[0].to_string();
                }
                let Some(body) = self.blocks.get(name) else {
                    debug!(block = name, "Unknown block reference");
                    return caps[0].to_string();
                };
                chain.push(name.to_string());
                let resolved = self.expand_blocks(body, chain, depth + 1);
                chain.pop();
                resolved
            })
            .into_owned()
    }
}

/// Replace `{name}` tokens with bound values; unbound tokens stay literal.
pub fn substitute_variables(text: &str, bindings: &Bindings) -> String {
    VARIABLE_REF
        .replace_all(text, |caps: &Captures<'_>| match bindings.get(&caps[1]) {
            Some(value) => value_to_text(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bindings(value: serde_json::Value) -> Bindings {
        value.as_object().cloned().unwrap_or_default()
    }

    fn blocks(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_bound_and_keeps_unbound() {
        let vars = bindings(json!({"assistantName": "Bot", "task": "help"}));
        let out = substitute_variables("Hi {assistantName}, {task}? {missing}", &vars);
        assert_eq!(out, "Hi Bot, help? {missing}");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let vars = bindings(json!({"n": 3, "flag": true, "list": [1, 2], "nothing": null}));
        let out = substitute_variables("{n} {flag} {list} [{nothing}]", &vars);
        assert_eq!(out, "3 true [1,2] []");
    }

    #[test]
    fn nested_blocks_resolve() {
        let table = blocks(&[
            ("outer", "A {component.inner} Z"),
            ("inner", "B {component.leaf} Y"),
            ("leaf", "C"),
        ]);
        let r = TemplateRenderer::new(&table);
        assert_eq!(r.render_text("{component.outer}", &Bindings::new()), "A B C Y Z");
    }

    #[test]
    fn blocks_can_contain_variables() {
        let table = blocks(&[("greeting", "Hello {name}")]);
        let r = TemplateRenderer::new(&table);
        let vars = bindings(json!({"name": "Ada"}));
        assert_eq!(r.render_text("{component.greeting}!", &vars), "Hello Ada!");
    }

    #[test]
    fn self_reference_left_unresolved() {
        let table = blocks(&[("loop", "x {component.loop}")]);
        let r = TemplateRenderer::new(&table);
        assert_eq!(
            r.render_text("{component.loop}", &Bindings::new()),
            "x {component.loop}"
        );
    }

    #[test]
    fn transitive_cycle_left_unresolved() {
        let table = blocks(&[("a", "a[{component.b}]"), ("b", "b[{component.a}]")]);
        let r = TemplateRenderer::new(&table);
        assert_eq!(
            r.render_text("{component.a}", &Bindings::new()),
            "a[b[{component.a}]]"
        );
    }

    #[test]
    fn sibling_references_are_not_cycles() {
        let table = blocks(&[("rule", "R"), ("pair", "{component.rule}{component.rule}")]);
        let r = TemplateRenderer::new(&table);
        assert_eq!(r.render_text("{component.pair}", &Bindings::new()), "RR");
    }

    #[test]
    fn depth_ceiling_stops_expansion() {
        let table = blocks(&[("l1", "1{component.l2}"), ("l2", "2{component.l3}"), ("l3", "3")]);
        let r = TemplateRenderer::new(&table).with_max_depth(2);
        assert_eq!(
            r.render_text("{component.l1}", &Bindings::new()),
            "12{component.l3}"
        );
    }

    #[test]
    fn unknown_block_left_literal() {
        let table = BTreeMap::new();
        let r = TemplateRenderer::new(&table);
        assert_eq!(
            r.render_text("see {component.nope}", &Bindings::new()),
            "see {component.nope}"
        );
    }

    #[test]
    fn chunks_joined_with_blank_line() {
        let table = BTreeMap::new();
        let r = TemplateRenderer::new(&table);
        let chunks = vec![Chunk::new("a", "first"), Chunk::new("b", "second")];
        assert_eq!(r.render(&chunks, &Bindings::new()), "first\n\nsecond");
    }

    #[test]
    fn rendering_is_idempotent() {
        let table = blocks(&[("a", "{component.b} {x}"), ("b", "{component.a}")]);
        let r = TemplateRenderer::new(&table);
        let vars = bindings(json!({"x": "1"}));
        let chunks = vec![Chunk::new("c", "{component.a} {y}")];
        assert_eq!(r.render(&chunks, &vars), r.render(&chunks, &vars));
    }
}
