use std::collections::HashMap;

use crate::model::{
    Container, ContainerId, ContainerKind, LeafId, LeafKind, NodeHandle, StoryGraph,
};

/// Resolves every raw id reference in the graph into handles: container
/// parents and children, speaker links, output edges, inverse input edges,
/// and each container's entry node. Must fully complete before any
/// structuring run starts; structuring then treats the graph as read-only.
pub fn resolve(graph: &mut StoryGraph) {
    assign_parents(graph);
    collect_children(graph);
    resolve_speakers(graph);
    resolve_outputs(graph);
    derive_inputs(graph);
    compute_entries(graph);
}

fn container_index(graph: &StoryGraph) -> HashMap<String, ContainerId> {
    graph
        .containers
        .iter()
        .enumerate()
        .map(|(idx, container)| (container.id.clone(), ContainerId(idx)))
        .collect()
}

fn assign_parents(graph: &mut StoryGraph) {
    let by_id = container_index(graph);
    for container in &mut graph.containers {
        container.parent = by_id.get(&container.parent_id).copied();
    }
    for leaf in &mut graph.leaves {
        leaf.parent = by_id.get(&leaf.parent_id).copied();
    }
}

/// Children are a structural join over the full population: everything whose
/// parent id names this container. Scene-level ownership keeps the original
/// ordering (dialogues, snippet references, conditions, instructions, code
/// blocks); hubs get a parent but are never owned children.
fn collect_children(graph: &mut StoryGraph) {
    let mut all_children: Vec<Vec<NodeHandle>> = Vec::with_capacity(graph.containers.len());

    for (idx, container) in graph.containers.iter().enumerate() {
        let owner = ContainerId(idx);
        let mut children = Vec::new();
        match container.kind {
            ContainerKind::Program => {
                collect_container_children(graph, owner, ContainerKind::Episode, &mut children);
            }
            ContainerKind::Episode => {
                collect_container_children(graph, owner, ContainerKind::Scene, &mut children);
            }
            ContainerKind::Scene | ContainerKind::Snippet => {
                collect_leaf_children(graph, owner, leaf_is_dialogue, &mut children);
                collect_container_children(graph, owner, ContainerKind::Snippet, &mut children);
                collect_leaf_children(graph, owner, leaf_is_condition, &mut children);
                collect_leaf_children(graph, owner, leaf_is_instruction, &mut children);
                collect_leaf_children(graph, owner, leaf_is_code, &mut children);
            }
        }
        all_children.push(children);
    }

    for (container, children) in graph.containers.iter_mut().zip(all_children) {
        container.children = children;
    }
}

fn collect_container_children(
    graph: &StoryGraph,
    owner: ContainerId,
    kind: ContainerKind,
    children: &mut Vec<NodeHandle>,
) {
    for (idx, candidate) in graph.containers.iter().enumerate() {
        if candidate.kind == kind && candidate.parent == Some(owner) {
            children.push(NodeHandle::Container(ContainerId(idx)));
        }
    }
}

fn collect_leaf_children(
    graph: &StoryGraph,
    owner: ContainerId,
    matches: fn(&LeafKind) -> bool,
    children: &mut Vec<NodeHandle>,
) {
    for (idx, leaf) in graph.leaves.iter().enumerate() {
        if leaf.parent == Some(owner) && matches(&leaf.kind) {
            children.push(NodeHandle::Leaf(LeafId(idx)));
        }
    }
}

fn leaf_is_dialogue(kind: &LeafKind) -> bool {
    matches!(kind, LeafKind::Dialogue { .. })
}

fn leaf_is_condition(kind: &LeafKind) -> bool {
    matches!(kind, LeafKind::Condition { .. })
}

fn leaf_is_instruction(kind: &LeafKind) -> bool {
    matches!(kind, LeafKind::Instruction { .. })
}

fn leaf_is_code(kind: &LeafKind) -> bool {
    matches!(kind, LeafKind::Code { .. })
}

fn resolve_speakers(graph: &mut StoryGraph) {
    let by_id: HashMap<String, crate::model::CharacterId> = graph
        .characters
        .iter()
        .enumerate()
        .map(|(idx, character)| (character.id.clone(), crate::model::CharacterId(idx)))
        .collect();
    for leaf in &mut graph.leaves {
        if let LeafKind::Dialogue {
            speaker_id, speaker, ..
        } = &mut leaf.kind
        {
            *speaker = by_id.get(speaker_id).copied();
        }
    }
}

/// Lookup table honoring the fixed target-search precedence: dialogues,
/// conditions, instructions, code blocks, snippets, hubs. First match wins.
struct TargetIndex {
    tables: [HashMap<String, NodeHandle>; 6],
}

impl TargetIndex {
    fn build(graph: &StoryGraph) -> Self {
        let mut dialogues = HashMap::new();
        let mut conditions = HashMap::new();
        let mut instructions = HashMap::new();
        let mut codes = HashMap::new();
        let mut snippets = HashMap::new();
        let mut hubs = HashMap::new();

        for (idx, leaf) in graph.leaves.iter().enumerate() {
            let handle = NodeHandle::Leaf(LeafId(idx));
            let table = match leaf.kind {
                LeafKind::Dialogue { .. } => &mut dialogues,
                LeafKind::Condition { .. } => &mut conditions,
                LeafKind::Instruction { .. } => &mut instructions,
                LeafKind::Code { .. } => &mut codes,
                LeafKind::Hub => &mut hubs,
            };
            table.entry(leaf.id.clone()).or_insert(handle);
        }

        for (idx, container) in graph.containers.iter().enumerate() {
            if container.kind == ContainerKind::Snippet {
                snippets
                    .entry(container.id.clone())
                    .or_insert(NodeHandle::Container(ContainerId(idx)));
            }
        }

        TargetIndex {
            tables: [dialogues, conditions, instructions, codes, snippets, hubs],
        }
    }

    fn find(&self, raw_id: &str) -> Option<NodeHandle> {
        self.tables
            .iter()
            .find_map(|table| table.get(raw_id).copied())
    }
}

/// Output resolution. Leaves and snippets resolve over the global population
/// (absent targets stay as explicit `None` slots); episodes and scenes link
/// only within their sibling set, skipping unmatched ids entirely. A raw
/// target equal to the node's own parent id is the implicit return-to-
/// container edge and is always dropped.
fn resolve_outputs(graph: &mut StoryGraph) {
    let index = TargetIndex::build(graph);

    let leaf_outputs: Vec<Vec<Option<NodeHandle>>> = graph
        .leaves
        .iter()
        .map(|leaf| {
            leaf.output_ids
                .iter()
                .filter(|raw| **raw != leaf.parent_id)
                .map(|raw| index.find(raw))
                .collect()
        })
        .collect();
    for (leaf, outputs) in graph.leaves.iter_mut().zip(leaf_outputs) {
        leaf.outputs = outputs;
    }

    let container_outputs: Vec<Vec<Option<NodeHandle>>> = graph
        .containers
        .iter()
        .map(|container| match container.kind {
            ContainerKind::Program => Vec::new(),
            ContainerKind::Snippet => container
                .output_ids
                .iter()
                .filter(|raw| **raw != container.parent_id)
                .map(|raw| index.find(raw))
                .collect(),
            ContainerKind::Episode | ContainerKind::Scene => {
                sibling_outputs(graph, container)
            }
        })
        .collect();
    for (container, outputs) in graph.containers.iter_mut().zip(container_outputs) {
        container.outputs = outputs;
    }
}

fn sibling_outputs(graph: &StoryGraph, container: &Container) -> Vec<Option<NodeHandle>> {
    let Some(parent) = container.parent else {
        return Vec::new();
    };
    let siblings = &graph.container(parent).children;
    container
        .output_ids
        .iter()
        .filter_map(|raw| {
            siblings
                .iter()
                .copied()
                .find(|handle| graph.node_articy_id(*handle) == raw)
                .map(Some)
        })
        .collect()
}

/// Inputs are derived by inverting every resolved output edge in a single
/// dedicated pass, so no ordering of the resolution above can leak into the
/// predecessor lists.
fn derive_inputs(graph: &mut StoryGraph) {
    for container in &mut graph.containers {
        container.inputs.clear();
    }
    for leaf in &mut graph.leaves {
        leaf.inputs.clear();
    }

    let mut edges: Vec<(NodeHandle, NodeHandle)> = Vec::new();
    for (idx, leaf) in graph.leaves.iter().enumerate() {
        let source = NodeHandle::Leaf(LeafId(idx));
        for target in leaf.outputs.iter().flatten() {
            edges.push((source, *target));
        }
    }
    for (idx, container) in graph.containers.iter().enumerate() {
        let source = NodeHandle::Container(ContainerId(idx));
        for target in container.outputs.iter().flatten() {
            edges.push((source, *target));
        }
    }

    for (source, target) in edges {
        match target {
            NodeHandle::Container(id) => graph.containers[id.0].inputs.push(source),
            NodeHandle::Leaf(id) => graph.leaves[id.0].inputs.push(source),
        }
    }
}

/// Entry node per container: start anywhere in the sibling set and follow
/// predecessor links (restricted to siblings) backward until none remain.
/// If the walk never escapes, the sibling set is fully cyclic; that is
/// recorded as a detected error rather than picking an arbitrary entry.
fn compute_entries(graph: &mut StoryGraph) {
    let mut entries: Vec<(Option<NodeHandle>, bool)> = Vec::with_capacity(graph.containers.len());

    for container in &graph.containers {
        if container.children.is_empty() {
            entries.push((None, false));
            continue;
        }

        let mut current = container.children[0];
        let mut steps = 0usize;
        let entry = loop {
            let predecessor = graph
                .node_inputs(current)
                .iter()
                .copied()
                .find(|candidate| container.children.contains(candidate));
            match predecessor {
                Some(previous) => {
                    steps += 1;
                    if steps > container.children.len() {
                        break None;
                    }
                    current = previous;
                }
                None => break Some(current),
            }
        };
        entries.push((entry, entry.is_none()));
    }

    for (container, (first, cycle)) in graph.containers.iter_mut().zip(entries) {
        container.first = first;
        container.entry_cycle = cycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use articy_formats::export::{RawDialogue, RawFragment, RawProject};

    fn fragment(id: &str, name: &str, parent: &str, outputs: &[&str]) -> RawFragment {
        RawFragment {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent.to_string(),
            text: String::new(),
            output_ids: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn dialogue(id: &str, parent: &str, text: &str, outputs: &[&str]) -> RawDialogue {
        RawDialogue {
            id: id.to_string(),
            parent_id: parent.to_string(),
            menu_text: String::new(),
            stage_directions: String::new(),
            speaker_id: String::new(),
            text: text.to_string(),
            output_ids: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn resolved_chain_project() -> StoryGraph {
        let project = RawProject {
            fragments: vec![
                fragment("game", "Game Demo", "", &[]),
                fragment("ep", "Episode 1 Pilot", "game", &[]),
                fragment("sc", "Scene 1 Intro", "ep", &[]),
            ],
            dialogues: vec![
                dialogue("a", "sc", "one", &["b"]),
                dialogue("b", "sc", "two", &["c"]),
                dialogue("c", "sc", "three", &["sc"]),
            ],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);
        graph
    }

    fn find_leaf(graph: &StoryGraph, id: &str) -> NodeHandle {
        let idx = graph
            .leaves
            .iter()
            .position(|leaf| leaf.id == id)
            .expect("leaf exists");
        NodeHandle::Leaf(LeafId(idx))
    }

    #[test]
    fn inverse_edge_symmetry() {
        let graph = resolved_chain_project();

        let mut forward = Vec::new();
        for (idx, leaf) in graph.leaves.iter().enumerate() {
            for target in leaf.outputs.iter().flatten() {
                forward.push((NodeHandle::Leaf(LeafId(idx)), *target));
            }
        }
        for (idx, container) in graph.containers.iter().enumerate() {
            for target in container.outputs.iter().flatten() {
                forward.push((NodeHandle::Container(ContainerId(idx)), *target));
            }
        }

        let mut inverse = Vec::new();
        for (idx, leaf) in graph.leaves.iter().enumerate() {
            for source in &leaf.inputs {
                inverse.push((*source, NodeHandle::Leaf(LeafId(idx))));
            }
        }
        for (idx, container) in graph.containers.iter().enumerate() {
            for source in &container.inputs {
                inverse.push((*source, NodeHandle::Container(ContainerId(idx))));
            }
        }

        forward.sort_by_key(|(a, b)| (format!("{a:?}"), format!("{b:?}")));
        inverse.sort_by_key(|(a, b)| (format!("{a:?}"), format!("{b:?}")));
        assert_eq!(forward, inverse);
    }

    #[test]
    fn entry_is_the_unique_zero_in_degree_child() {
        let graph = resolved_chain_project();
        let scene = graph
            .containers
            .iter()
            .find(|c| c.kind == ContainerKind::Scene)
            .expect("scene exists");

        assert_eq!(scene.first, Some(find_leaf(&graph, "a")));

        let zero_in_degree: Vec<_> = scene
            .children
            .iter()
            .filter(|child| {
                !graph
                    .node_inputs(**child)
                    .iter()
                    .any(|input| scene.children.contains(input))
            })
            .collect();
        assert_eq!(zero_in_degree.len(), 1);
        assert_eq!(*zero_in_degree[0], scene.first.unwrap());
    }

    #[test]
    fn self_parent_edges_are_filtered() {
        let graph = resolved_chain_project();
        let NodeHandle::Leaf(c_id) = find_leaf(&graph, "c") else {
            unreachable!();
        };
        // c's only raw output pointed back at its own scene.
        assert!(graph.leaf(c_id).outputs.is_empty());
        let scene = graph
            .containers
            .iter()
            .find(|c| c.kind == ContainerKind::Scene)
            .unwrap();
        assert!(scene.inputs.is_empty());
    }

    #[test]
    fn dangling_targets_resolve_to_absent_slots() {
        let project = RawProject {
            fragments: vec![fragment("sc", "Scene 1 Intro", "", &[])],
            dialogues: vec![dialogue("a", "sc", "one", &["missing"])],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);
        assert_eq!(graph.leaves[0].outputs, vec![None]);
    }

    #[test]
    fn cyclic_sibling_set_has_no_entry() {
        let project = RawProject {
            fragments: vec![fragment("sc", "Scene 1 Loop", "", &[])],
            dialogues: vec![
                dialogue("a", "sc", "one", &["b"]),
                dialogue("b", "sc", "two", &["a"]),
            ],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);
        let scene = &graph.containers[0];
        assert!(scene.first.is_none());
        assert!(scene.entry_cycle);
    }

    #[test]
    fn episodes_link_only_within_their_sibling_set() {
        let project = RawProject {
            fragments: vec![
                fragment("game", "Game Demo", "", &[]),
                fragment("ep1", "Episode 1 Pilot", "game", &["ep2"]),
                fragment("ep2", "Episode 2 Return", "game", &["stray"]),
                fragment("sc", "Scene 1 Intro", "ep1", &[]),
            ],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);

        let game = graph.program.map(|id| graph.container(id)).unwrap();
        assert_eq!(game.children.len(), 2);
        let ep1 = graph
            .containers
            .iter()
            .find(|c| c.id == "ep1")
            .unwrap();
        assert_eq!(ep1.outputs.len(), 1);
        assert!(ep1.outputs[0].is_some());
        assert_eq!(game.first, Some(game.children[0]));
        let ep2 = graph.containers.iter().find(|c| c.id == "ep2").unwrap();
        // "stray" matches no sibling, so the unmatched edge is dropped.
        assert!(ep2.outputs.is_empty());
    }

    #[test]
    fn speaker_ids_resolve_against_the_character_table() {
        use articy_formats::export::RawCharacter;
        let project = RawProject {
            characters: vec![RawCharacter {
                id: "char".into(),
                name: "Aurora".into(),
                color: (10, 20, 30),
                abbrev: "au".into(),
            }],
            fragments: vec![fragment("sc", "Scene 1 Intro", "", &[])],
            dialogues: vec![RawDialogue {
                speaker_id: "char".into(),
                ..dialogue("a", "sc", "hi", &[])
            }],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);
        let LeafKind::Dialogue { speaker, .. } = &graph.leaves[0].kind else {
            panic!("expected dialogue leaf");
        };
        assert_eq!(*speaker, Some(crate::model::CharacterId(0)));
    }
}
