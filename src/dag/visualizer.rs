use super::graph::StackGraph;

/// Convert the stack dependency graph to DOT format for visualization.
///
/// Edges point from a dependency to the stack that needs it, i.e. in
/// deployment order.
pub fn to_dot(graph: &StackGraph) -> String {
    let mut lines = Vec::new();
    lines.push("digraph stratus {".to_string());
    lines.push("    rankdir=TB;".to_string());
    lines.push("    node [shape=box, style=filled, fillcolor=lightblue];".to_string());

    for stack in graph.stacks() {
        let style = if stack.obsolete {
            ", fillcolor=lightgrey, style=\"filled,dashed\""
        } else if stack.ignore {
            ", fillcolor=lightgrey"
        } else {
            ""
        };
        lines.push(format!(
            "    \"{}\" [label=\"{}\"{}];",
            stack.name, stack.name, style
        ));
    }

    let mut edges = graph.edges();
    edges.sort();
    for (stack, dependency) in edges {
        lines.push(format!("    \"{}\" -> \"{}\";", dependency.name, stack.name));
    }

    lines.push("}".to_string());
    lines.join("\n")
}
