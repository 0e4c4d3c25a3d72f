use thiserror::Error;

use crate::model::{
    menu_tag, renpy_expression, ContainerId, LeafKind, NodeHandle, StoryGraph, INDENT,
};

/// A structuring failure. Fatal to the current container only; the caller
/// skips the container and keeps going with the rest of the graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("container '{container}': join at node {node} with no open branch context")]
    UnreconciledJoin { container: String, node: String },
    #[error("container '{container}': menu join at node {node} leaves options unreconciled")]
    InconsistentMenuJoin { container: String, node: String },
    #[error("container '{container}': menu option node {node} has no choice label")]
    MissingChoiceLabel { container: String, node: String },
    #[error("container '{container}': children form a cycle, no entry node")]
    EntryCycle { container: String },
}

/// One container's emitted script plus the image directives it referenced,
/// in first-use order.
#[derive(Debug, Clone)]
pub struct ContainerScript {
    pub prefix: String,
    pub title: String,
    pub lines: Vec<String>,
    pub images: Vec<String>,
}

#[derive(Debug)]
struct ConditionContext {
    true_pass: bool,
    false_path: Option<NodeHandle>,
}

#[derive(Debug)]
struct MenuOption {
    label: String,
    tag: String,
    entry: Option<NodeHandle>,
    /// The node this option's path was last seen terminating at. Only
    /// meaningful once `followed` is set.
    continued_at: Option<NodeHandle>,
    followed: bool,
}

#[derive(Debug)]
struct MenuContext {
    options: Vec<MenuOption>,
}

impl MenuContext {
    fn follow_current(&mut self, continuation: NodeHandle) {
        if let Some(option) = self.options.iter_mut().find(|o| !o.followed) {
            option.continued_at = Some(continuation);
            option.followed = true;
        }
    }

    fn all_followed(&self) -> bool {
        self.options.iter().all(|o| o.followed)
    }

    fn next_unfollowed(&self) -> Option<&MenuOption> {
        self.options.iter().find(|o| !o.followed)
    }

    fn count_converging(&self, continuation: NodeHandle) -> usize {
        self.options
            .iter()
            .filter(|o| o.followed && o.continued_at == Some(continuation))
            .count()
    }

    /// Tag of the first followed option sharing this continuation; names the
    /// shared `_end` join label.
    fn converging_tag(&self, continuation: NodeHandle) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.followed && o.continued_at == Some(continuation))
            .map(|o| o.tag.as_str())
    }
}

#[derive(Debug)]
enum Context {
    Condition(ConditionContext),
    Menu(MenuContext),
}

fn push_line(lines: &mut Vec<String>, depth: usize, text: &str) {
    lines.push(format!("{}{}", INDENT.repeat(depth), text));
}

/// Walks one container's resolved leaf graph and emits its structured
/// script body. The traversal keeps a stack of open branch contexts;
/// every node with more than one predecessor is a join point that must
/// reconcile against the top of that stack.
pub fn structure_container(
    graph: &StoryGraph,
    id: ContainerId,
) -> Result<ContainerScript, StructureError> {
    let container = graph.container(id);
    let prefix = graph.container_prefix(id);
    let title = graph.container_title(id);

    if container.entry_cycle {
        return Err(StructureError::EntryCycle {
            container: title.clone(),
        });
    }

    let mut lines = vec![
        format!("# ({prefix}) {title}"),
        String::new(),
        format!("label {prefix}:"),
    ];
    let mut images: Vec<String> = Vec::new();
    let mut stack: Vec<Context> = Vec::new();
    let mut depth = 1usize;
    let mut walk = container.first;

    while let Some(node) = walk {
        if let NodeHandle::Leaf(leaf_id) = node {
            if let Some(directive) = graph.dialogue_asset(graph.leaf(leaf_id)) {
                if !images.contains(&directive.image) {
                    images.push(directive.image);
                }
            }
        }

        // Conditions open a new context before any join handling: the test
        // line is emitted here and both branches rendered via later joins.
        if let NodeHandle::Leaf(leaf_id) = node {
            if let LeafKind::Condition { expression } = &graph.leaf(leaf_id).kind {
                let outputs = graph.node_outputs(node);
                let true_path = outputs.first().copied().flatten();
                let false_path = outputs.get(1).copied().flatten();
                lines.push(String::new());
                push_line(
                    &mut lines,
                    depth,
                    &format!("if {}:", renpy_expression(expression)),
                );
                stack.push(Context::Condition(ConditionContext {
                    true_pass: true,
                    false_path,
                }));
                depth += 1;
                walk = true_path;
                continue;
            }
        }

        if graph.node_inputs(node).len() > 1 {
            match stack.pop() {
                None => {
                    return Err(StructureError::UnreconciledJoin {
                        container: title,
                        node: graph.node_articy_id(node).to_string(),
                    });
                }
                Some(Context::Condition(mut context)) => {
                    if context.true_pass {
                        lines.push(String::new());
                        push_line(&mut lines, depth - 1, "else:");
                        context.true_pass = false;
                        walk = context.false_path;
                        stack.push(Context::Condition(context));
                        continue;
                    }
                    // Both branches consumed; close the block and render the
                    // join node below.
                    depth -= 1;
                }
                Some(Context::Menu(mut context)) => {
                    context.follow_current(node);
                    let inbound = graph.node_inputs(node).len();
                    if context.all_followed() && context.count_converging(node) == inbound {
                        // Every path reconverges here: close the menu with
                        // its shared join label and render the node below.
                        depth -= 1;
                        let tag = context
                            .converging_tag(node)
                            .expect("current option converges here")
                            .to_string();
                        lines.push(String::new());
                        push_line(&mut lines, depth, &format!("label {tag}_end:"));
                    } else {
                        let tag = context
                            .converging_tag(node)
                            .expect("current option converges here")
                            .to_string();
                        lines.push(String::new());
                        push_line(&mut lines, depth, &format!("jump {tag}_end"));
                        depth -= 1;
                        match context.next_unfollowed() {
                            Some(option) => {
                                let next_tag = option.tag.clone();
                                let next_entry = option.entry;
                                lines.push(String::new());
                                push_line(&mut lines, depth, &format!("label {next_tag}:"));
                                depth += 1;
                                walk = next_entry;
                                stack.push(Context::Menu(context));
                                continue;
                            }
                            None => {
                                return Err(StructureError::InconsistentMenuJoin {
                                    container: title,
                                    node: graph.node_articy_id(node).to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        if let NodeHandle::Leaf(leaf_id) = node {
            if let Some(directive) = graph.dialogue_asset(graph.leaf(leaf_id)) {
                lines.push(String::new());
                push_line(&mut lines, depth, &directive.scene_line());
            }
        }

        let body = graph.node_script_lines(node);
        if body.is_empty() {
            push_line(&mut lines, depth, "pause");
        } else {
            for line in body {
                if line.is_empty() {
                    lines.push(String::new());
                } else {
                    push_line(&mut lines, depth, &line);
                }
            }
        }

        let outputs = graph.node_outputs(node);
        if outputs.len() > 1 {
            let context = build_menu_context(graph, &prefix, &title, node)?;
            match context {
                Some(context) => {
                    lines.push(String::new());
                    push_line(&mut lines, depth, "menu:");
                    push_line(&mut lines, depth + 1, "\" \"");
                    for option in &context.options {
                        lines.push(String::new());
                        push_line(&mut lines, depth + 1, &format!("\"{}\":", option.label));
                        push_line(&mut lines, depth + 2, &format!("jump {}", option.tag));
                    }
                    let opening = context
                        .next_unfollowed()
                        .expect("fresh menu has unfollowed options");
                    let opening_tag = opening.tag.clone();
                    let opening_entry = opening.entry;
                    lines.push(String::new());
                    push_line(&mut lines, depth, &format!("label {opening_tag}:"));
                    depth += 1;
                    walk = opening_entry;
                    stack.push(Context::Menu(context));
                }
                None => {
                    // Not a menu: a multi-way fan-out of containers is some
                    // authored state-machine construct we cannot reduce to
                    // structured branching. Emit cross-reference calls and
                    // stop walking this container.
                    for target in outputs.iter().flatten() {
                        lines.push(String::new());
                        push_line(
                            &mut lines,
                            depth,
                            &format!(
                                "call {} # {}",
                                graph.node_call_label(*target),
                                graph.node_desc(*target)
                            ),
                        );
                    }
                    walk = None;
                }
            }
        } else {
            walk = graph.next_of(node);
        }
    }

    lines.push(String::new());
    lines.push(format!("{INDENT}return"));

    Ok(ContainerScript {
        prefix,
        title,
        lines,
        images,
    })
}

/// Decides whether a multi-output node is a menu. All outputs must be
/// dialogue leaves carrying choice-label text; a labeled-dialogue output
/// missing its label is an authoring error, and any other output kind
/// makes this the unsupported multi-way construct (`Ok(None)`).
fn build_menu_context(
    graph: &StoryGraph,
    prefix: &str,
    container_title: &str,
    node: NodeHandle,
) -> Result<Option<MenuContext>, StructureError> {
    let mut options = Vec::new();
    let mut is_menu = true;

    for target in graph.node_outputs(node) {
        match target {
            Some(NodeHandle::Leaf(leaf_id)) if graph.leaf(*leaf_id).is_dialogue() => {
                let leaf = graph.leaf(*leaf_id);
                let LeafKind::Dialogue { menu_text, .. } = &leaf.kind else {
                    unreachable!("checked is_dialogue above");
                };
                if menu_text.trim().is_empty() {
                    return Err(StructureError::MissingChoiceLabel {
                        container: container_title.to_string(),
                        node: leaf.id.clone(),
                    });
                }
                options.push(MenuOption {
                    label: menu_text.clone(),
                    tag: menu_tag(prefix, menu_text),
                    entry: Some(NodeHandle::Leaf(*leaf_id)),
                    continued_at: None,
                    followed: false,
                });
            }
            _ => is_menu = false,
        }
    }

    Ok(if is_menu {
        Some(MenuContext { options })
    } else {
        None
    })
}
