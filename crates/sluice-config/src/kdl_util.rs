// Helpers for extracting values from KDL nodes.

use kdl::KdlNode;

pub(crate) fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// A boolean given either as the first argument (`noop #true`) or as a
/// string (`noop "true"`).
pub(crate) fn bool_arg(node: &KdlNode) -> Option<bool> {
    let value = node.entries().iter().find(|e| e.name().is_none())?.value();
    value.as_bool().or_else(|| match value.as_string()? {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    })
}

/// String properties as `key=value` pairs, in declaration order.
pub(crate) fn string_props(node: &KdlNode) -> Vec<(String, String)> {
    node.entries()
        .iter()
        .filter_map(|e| {
            let name = e.name()?.value().to_string();
            let value = e.value().as_string()?.to_string();
            Some((name, value))
        })
        .collect()
}

/// Values for `name`, given as repeated properties (`passed="a" passed="b"`)
/// or as a child node (`passed "a" "b"`).
pub(crate) fn string_list(node: &KdlNode, name: &str) -> Vec<String> {
    let from_props: Vec<String> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_some_and(|n| n.value() == name))
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect();

    if !from_props.is_empty() {
        return from_props;
    }

    node.children()
        .into_iter()
        .flat_map(|children| children.nodes())
        .filter(|child| child.name().value() == name)
        .flat_map(all_string_args)
        .collect()
}
