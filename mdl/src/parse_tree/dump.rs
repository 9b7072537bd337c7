//! Deterministic text rendering of the parse tree, used by golden tests.

use std::fmt::Write;

use super::Node;

/// Dump `node` and its subtree, one node header per line, children one tab deeper.
pub fn dump(node: &Node) -> String {
    let mut out = String::new();
    write_node(&mut out, node, "");
    out
}

fn write_node(out: &mut String, node: &Node, indent: &str) {
    out.push_str(indent);
    out.push_str(node.node_type().name());
    if !node.class.is_empty() {
        out.push('/');
        out.push_str(&node.class);
    }
    if !node.text.is_empty() {
        out.push(' ');
        out.push_str(&node.text);
    }
    write_args(out, &node.args);
    out.push('\n');

    let nested = format!("{indent}\t\t");
    for annotation in &node.annotations {
        let _ = write!(out, "{indent}\t@{}", annotation.name);
        write_args(out, &annotation.args);
        out.push('\n');
        if let Some(sub) = &annotation.node {
            write_node(out, sub, &nested);
        }
    }

    if !node.attrs.is_empty() {
        let _ = writeln!(out, "{indent}\tattrs");
        for attr in &node.attrs {
            write_node(out, attr, &nested);
        }
    }

    let child_indent = format!("{indent}\t");
    for child in node.children() {
        write_node(out, child, &child_indent);
    }
}

fn write_args(out: &mut String, args: &[String]) {
    if !args.is_empty() {
        out.push('[');
        out.push_str(&args.join(","));
        out.push(']');
    }
}
