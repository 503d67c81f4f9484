//! Explain trees and plan fingerprints for compiled traversal accessors.

use std::fmt::Write as _;
use std::hash::Hasher;

use xxhash_rust::xxh64::Xxh64;

/// Explain node describing one compiled artifact.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplainNode {
    /// Operator name
    pub op: String,
    /// Additional properties describing the operator
    pub props: Vec<ExplainProp>,
    /// Nested nodes
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given operator name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Looks up the first property named `key`.
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Copy of the tree with every redactable value replaced by `?`.
    pub fn redacted(&self) -> Self {
        Self {
            op: self.op.clone(),
            props: self
                .props
                .iter()
                .map(|p| {
                    if p.redactable {
                        ExplainProp::literal(p.key.clone(), "?")
                    } else {
                        p.clone()
                    }
                })
                .collect(),
            inputs: self.inputs.iter().map(ExplainNode::redacted).collect(),
        }
    }

    /// Indented text rendering, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let _ = write!(out, "{:indent$}{}", "", self.op, indent = indent * 2);
        for prop in &self.props {
            let _ = write!(out, " {}={}", prop.key, prop.value);
        }
        out.push('\n');
        for input in &self.inputs {
            input.render_into(out, indent + 1);
        }
    }

    /// Deterministic xxh64 fingerprint of the whole tree.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hash_explain_node(self, &mut hasher);
        hasher.finish()
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    /// Property without user data.
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    /// Property that may carry user literals.
    pub fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: true,
        }
    }
}

fn hash_explain_node(node: &ExplainNode, hasher: &mut Xxh64) {
    hasher.write(node.op.as_bytes());
    hasher.write_u64(node.props.len() as u64);
    for prop in &node.props {
        hasher.write(prop.key.as_bytes());
        hasher.write_u8(0);
        hasher.write(prop.value.as_bytes());
        hasher.write_u8(0);
    }
    hasher.write_u64(node.inputs.len() as u64);
    for child in &node.inputs {
        hash_explain_node(child, hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExplainNode {
        let mut root = ExplainNode::new("Root");
        root.props.push(ExplainProp::plain("count", "1"));
        let mut child = ExplainNode::new("Leaf");
        child
            .props
            .push(ExplainProp::literal("condition", "e.label == \"x\""));
        root.inputs.push(child);
        root
    }

    #[test]
    fn render_indents_children() {
        assert_eq!(
            sample().render(),
            "Root count=1\n  Leaf condition=e.label == \"x\"\n"
        );
    }

    #[test]
    fn redaction_keeps_plain_props() {
        let redacted = sample().redacted();
        assert_eq!(redacted.prop("count"), Some("1"));
        assert_eq!(redacted.inputs[0].prop("condition"), Some("?"));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.inputs[0].props[0].value.push('!');
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_separates_key_and_value() {
        let mut a = ExplainNode::new("N");
        a.props.push(ExplainProp::plain("ab", "c"));
        let mut b = ExplainNode::new("N");
        b.props.push(ExplainProp::plain("a", "bc"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
