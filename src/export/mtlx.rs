//! MaterialX document export.
//!
//! Writes one `surfacematerial`, one shader node and the helper nodes of
//! every network into a single MaterialX 1.38 document. Nested networks
//! keep their helpers inside a `nodegraph`; flattened ones place them at
//! document level.

use crate::shading::{Helpers, Input, InputSource, Node, ShadingNetwork};
use std::fmt::Write;

/// Escape the characters XML forbids inside attribute values.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn write_input(xml: &mut String, indent: &str, input: &Input) {
    let _ = write!(
        xml,
        "{}<input name=\"{}\" type=\"{}\"",
        indent,
        escape_attr(&input.name),
        input.ty.mtlx_name()
    );
    match &input.source {
        InputSource::Value(value) => {
            let _ = write!(xml, " value=\"{}\"", escape_attr(&value.to_mtlx_string()));
        }
        InputSource::Node { node, output } => {
            let _ = write!(xml, " nodename=\"{}\"", escape_attr(node));
            if let Some(output) = output {
                let _ = write!(xml, " output=\"{}\"", escape_attr(output));
            }
        }
        InputSource::GraphOutput { graph, output } => {
            let _ = write!(xml, " nodegraph=\"{}\" output=\"{}\"", escape_attr(graph), escape_attr(output));
        }
    }
    if let Some(colorspace) = &input.colorspace {
        let _ = write!(xml, " colorspace=\"{}\"", escape_attr(colorspace));
    }
    let _ = writeln!(xml, " />");
}

fn write_node(xml: &mut String, indent: &str, node: &Node) {
    let _ = write!(
        xml,
        "{}<{} name=\"{}\" type=\"{}\"",
        indent,
        node.kind.category(),
        escape_attr(&node.name),
        node.ty.mtlx_name()
    );
    if let Some(colorspace) = &node.colorspace {
        let _ = write!(xml, " colorspace=\"{}\"", escape_attr(colorspace));
    }
    if node.inputs.is_empty() && node.outputs.is_empty() {
        let _ = writeln!(xml, " />");
        return;
    }
    let _ = writeln!(xml, ">");
    let child = format!("{}  ", indent);
    for input in &node.inputs {
        write_input(xml, &child, input);
    }
    for output in &node.outputs {
        let _ = writeln!(
            xml,
            "{}<output name=\"{}\" type=\"{}\" />",
            child,
            escape_attr(&output.name),
            output.ty.mtlx_name()
        );
    }
    let _ = writeln!(xml, "{}</{}>", indent, node.kind.category());
}

fn write_network(xml: &mut String, network: &ShadingNetwork) {
    match &network.helpers {
        Helpers::Nested(graph) => {
            let _ = writeln!(xml, "  <nodegraph name=\"{}\">", escape_attr(&graph.name));
            for node in &graph.nodes {
                write_node(xml, "    ", node);
            }
            for output in &graph.outputs {
                let _ = write!(
                    xml,
                    "    <output name=\"{}\" type=\"{}\" nodename=\"{}\"",
                    escape_attr(&output.name),
                    output.ty.mtlx_name(),
                    escape_attr(&output.node)
                );
                if let Some(node_output) = &output.output {
                    let _ = write!(xml, " output=\"{}\"", escape_attr(node_output));
                }
                let _ = writeln!(xml, " />");
            }
            let _ = writeln!(xml, "  </nodegraph>");
        }
        Helpers::Flattened(nodes) => {
            for node in nodes {
                write_node(xml, "  ", node);
            }
        }
    }
    write_node(xml, "  ", &network.shader);
    write_node(xml, "  ", &network.material);
}

/// Render networks as a MaterialX document.
pub fn export_mtlx(networks: &[ShadingNetwork]) -> String {
    let mut xml = String::with_capacity(1024 + networks.len() * 4096);
    let _ = writeln!(xml, "<?xml version=\"1.0\"?>");
    let _ = writeln!(xml, "<materialx version=\"1.38\" colorspace=\"lin_rec709\">");
    for network in networks {
        write_network(&mut xml, network);
    }
    let _ = writeln!(xml, "</materialx>");
    xml
}
