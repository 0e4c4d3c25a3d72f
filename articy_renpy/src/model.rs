use articy_formats::export::{RawFragment, RawProject};

/// One indentation unit of the generated script.
pub const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacterId(pub usize);

/// Handle into one of the graph's owning tables. All node relationships
/// (parent, children, outputs, inputs) are stored as handles so the graph
/// can be arbitrarily cyclic without ownership cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeHandle {
    Container(ContainerId),
    Leaf(LeafId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Program,
    Episode,
    Scene,
    Snippet,
}

/// A hierarchical grouping node. `children` and `first` are filled in by the
/// resolver; until then only the raw id fields are meaningful.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub kind: ContainerKind,
    pub num: u32,
    pub desc: String,
    pub parent_id: String,
    pub output_ids: Vec<String>,
    pub parent: Option<ContainerId>,
    pub children: Vec<NodeHandle>,
    pub first: Option<NodeHandle>,
    /// Set when the sibling set has no zero-in-degree entry node.
    pub entry_cycle: bool,
    pub outputs: Vec<Option<NodeHandle>>,
    pub inputs: Vec<NodeHandle>,
}

#[derive(Debug, Clone)]
pub enum LeafKind {
    Dialogue {
        menu_text: String,
        stage_directions: String,
        speaker_id: String,
        text: String,
        speaker: Option<CharacterId>,
    },
    Condition {
        expression: String,
    },
    Instruction {
        expression: String,
    },
    Code {
        text: String,
    },
    Hub,
}

#[derive(Debug, Clone)]
pub struct Leaf {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub output_ids: Vec<String>,
    pub kind: LeafKind,
    pub parent: Option<ContainerId>,
    pub outputs: Vec<Option<NodeHandle>>,
    pub inputs: Vec<NodeHandle>,
}

impl Leaf {
    pub fn is_dialogue(&self) -> bool {
        matches!(self.kind, LeafKind::Dialogue { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub color: (u8, u8, u8),
    pub abbrev: String,
}

impl Character {
    pub fn hex_color(&self) -> String {
        let (r, g, b) = self.color;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// The image annotation carried by a dialogue line, split into the
/// prefixed image name and the optional transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDirective {
    pub image: String,
    pub transition: Option<String>,
}

impl AssetDirective {
    pub fn scene_line(&self) -> String {
        match &self.transition {
            Some(transition) => format!("scene {} with {}", self.image, transition),
            None => format!("scene {}", self.image),
        }
    }
}

const DEFAULT_TRANSITION: &str = "dissolve";
const UNRESOLVED_PREFIX: &str = "???????";
const UNDEFINED_SPEAKER: &str = "UNDEF";

/// Arena storage for the whole narrative graph: one owning table per entity
/// kind, everything else expressed as handles.
#[derive(Debug, Clone, Default)]
pub struct StoryGraph {
    pub characters: Vec<Character>,
    pub containers: Vec<Container>,
    pub leaves: Vec<Leaf>,
    pub program: Option<ContainerId>,
}

impl StoryGraph {
    /// Builds the unresolved graph from the raw export records. Generic flow
    /// fragments are classified by the leading keyword of their display name;
    /// fragments matching no keyword are dropped with a warning.
    pub fn from_records(project: RawProject) -> Self {
        let RawProject {
            characters,
            dialogues,
            conditions,
            instructions,
            hubs,
            fragments,
            unhandled: _,
        } = project;

        let mut graph = StoryGraph::default();

        for character in characters {
            graph.characters.push(Character {
                id: character.id,
                name: character.name,
                color: character.color,
                abbrev: character.abbrev,
            });
        }

        for fragment in fragments {
            graph.classify_fragment(fragment);
        }

        for dialogue in dialogues {
            graph.leaves.push(Leaf {
                id: dialogue.id,
                name: String::new(),
                parent_id: dialogue.parent_id,
                output_ids: dialogue.output_ids,
                kind: LeafKind::Dialogue {
                    menu_text: dialogue.menu_text,
                    stage_directions: dialogue.stage_directions,
                    speaker_id: dialogue.speaker_id,
                    text: dialogue.text,
                    speaker: None,
                },
                parent: None,
                outputs: Vec::new(),
                inputs: Vec::new(),
            });
        }

        for condition in conditions {
            let expression = condition.expression;
            graph.push_leaf_from_fragment(condition.fragment, LeafKind::Condition { expression });
        }

        for instruction in instructions {
            let expression = instruction.expression;
            graph.push_leaf_from_fragment(instruction.fragment, LeafKind::Instruction { expression });
        }

        for hub in hubs {
            graph.push_leaf_from_fragment(hub, LeafKind::Hub);
        }

        graph
    }

    fn classify_fragment(&mut self, fragment: RawFragment) {
        for (keyword, kind) in [
            ("game", ContainerKind::Program),
            ("episode", ContainerKind::Episode),
            ("scene", ContainerKind::Scene),
            ("snippet", ContainerKind::Snippet),
        ] {
            if name_matches_keyword(&fragment.name, keyword) {
                let (num, desc) = parse_titled_name(&fragment.name, keyword);
                let container_id = ContainerId(self.containers.len());
                self.containers.push(Container {
                    id: fragment.id,
                    name: fragment.name,
                    kind,
                    num,
                    desc,
                    parent_id: fragment.parent_id,
                    output_ids: fragment.output_ids,
                    parent: None,
                    children: Vec::new(),
                    first: None,
                    entry_cycle: false,
                    outputs: Vec::new(),
                    inputs: Vec::new(),
                });
                if kind == ContainerKind::Program {
                    self.program = Some(container_id);
                }
                return;
            }
        }

        if name_matches_keyword(&fragment.name, "code") {
            let text = fragment.text.clone();
            self.push_leaf_from_fragment(fragment, LeafKind::Code { text });
            return;
        }

        eprintln!(
            "[articy_renpy] warning: flow fragment '{}' ({}) matches no container keyword, dropped",
            fragment.name, fragment.id
        );
    }

    fn push_leaf_from_fragment(&mut self, fragment: RawFragment, kind: LeafKind) {
        self.leaves.push(Leaf {
            id: fragment.id,
            name: fragment.name,
            parent_id: fragment.parent_id,
            output_ids: fragment.output_ids,
            kind,
            parent: None,
            outputs: Vec::new(),
            inputs: Vec::new(),
        });
    }

    pub fn container(&self, id: ContainerId) -> &Container {
        &self.containers[id.0]
    }

    pub fn leaf(&self, id: LeafId) -> &Leaf {
        &self.leaves[id.0]
    }

    pub fn character(&self, id: CharacterId) -> &Character {
        &self.characters[id.0]
    }

    pub fn node_articy_id(&self, handle: NodeHandle) -> &str {
        match handle {
            NodeHandle::Container(id) => &self.container(id).id,
            NodeHandle::Leaf(id) => &self.leaf(id).id,
        }
    }

    pub fn node_outputs(&self, handle: NodeHandle) -> &[Option<NodeHandle>] {
        match handle {
            NodeHandle::Container(id) => &self.container(id).outputs,
            NodeHandle::Leaf(id) => &self.leaf(id).outputs,
        }
    }

    pub fn node_inputs(&self, handle: NodeHandle) -> &[NodeHandle] {
        match handle {
            NodeHandle::Container(id) => &self.container(id).inputs,
            NodeHandle::Leaf(id) => &self.leaf(id).inputs,
        }
    }

    /// The straight-line successor: the first output slot, if present.
    pub fn next_of(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.node_outputs(handle).first().copied().flatten()
    }

    /// Script label prefix: `ep<n>` for episodes, `<parent>sc<nn>` /
    /// `<parent>sn<nn>` for scenes and snippets. A container whose parent
    /// never resolved renders the placeholder prefix.
    pub fn container_prefix(&self, id: ContainerId) -> String {
        let container = self.container(id);
        match container.kind {
            ContainerKind::Program => String::new(),
            ContainerKind::Episode => format!("ep{}", container.num),
            ContainerKind::Scene | ContainerKind::Snippet => {
                let tag = if container.kind == ContainerKind::Scene {
                    "sc"
                } else {
                    "sn"
                };
                match container.parent {
                    Some(parent) => {
                        format!("{}{}{:02}", self.container_prefix(parent), tag, container.num)
                    }
                    None => UNRESOLVED_PREFIX.to_string(),
                }
            }
        }
    }

    pub fn container_title(&self, id: ContainerId) -> String {
        let container = self.container(id);
        match container.kind {
            ContainerKind::Program => format!("Game: {}", container.desc),
            ContainerKind::Episode => format!("Episode {}: {}", container.num, container.desc),
            ContainerKind::Scene => format!("Scene {}: {}", container.num, container.desc),
            ContainerKind::Snippet => format!("Snippet {}: {}", container.num, container.desc),
        }
    }

    /// Label used when a node is referenced through a cross-reference call.
    pub fn node_call_label(&self, handle: NodeHandle) -> String {
        match handle {
            NodeHandle::Container(id) => self.container_prefix(id),
            NodeHandle::Leaf(id) => {
                let leaf = self.leaf(id);
                if leaf.name.is_empty() {
                    leaf.id.clone()
                } else {
                    leaf.name.clone()
                }
            }
        }
    }

    pub fn node_desc(&self, handle: NodeHandle) -> String {
        match handle {
            NodeHandle::Container(id) => self.container(id).desc.clone(),
            NodeHandle::Leaf(id) => self.leaf(id).name.clone(),
        }
    }

    /// The script body a single node contributes, without indentation.
    /// Conditions never reach this point (the traversal intercepts them) and
    /// hubs contribute nothing; the traversal substitutes a `pause`.
    pub fn node_script_lines(&self, handle: NodeHandle) -> Vec<String> {
        match handle {
            NodeHandle::Container(id) => {
                let container = self.container(id);
                vec![
                    String::new(),
                    format!("call {} # {}", self.container_prefix(id), container.desc),
                ]
            }
            NodeHandle::Leaf(id) => self.leaf_script_lines(self.leaf(id)),
        }
    }

    fn leaf_script_lines(&self, leaf: &Leaf) -> Vec<String> {
        match &leaf.kind {
            LeafKind::Dialogue { text, speaker, .. } => {
                let speaker_tag = speaker
                    .map(|id| self.character(id).abbrev.as_str())
                    .unwrap_or(UNDEFINED_SPEAKER);
                let mut lines = Vec::new();
                for line in text.lines() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if speaker_tag == "command" {
                        lines.push(trimmed.to_string());
                    } else {
                        lines.push(format!("{speaker_tag} \"{trimmed}\""));
                    }
                }
                lines
            }
            LeafKind::Instruction { expression } => {
                vec![String::new(), format!("$ {}", renpy_expression(expression))]
            }
            LeafKind::Code { text } => {
                let mut lines = vec![String::new()];
                for line in text.lines() {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        lines.push(format!("# {trimmed}"));
                    }
                }
                lines
            }
            LeafKind::Condition { .. } | LeafKind::Hub => Vec::new(),
        }
    }

    /// Parses a dialogue leaf's stage-directions annotation into an image
    /// directive. Returns `None` for other leaf kinds or an empty annotation.
    pub fn dialogue_asset(&self, leaf: &Leaf) -> Option<AssetDirective> {
        let LeafKind::Dialogue {
            stage_directions, ..
        } = &leaf.kind
        else {
            return None;
        };
        let mut parts = stage_directions.splitn(2, '|');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return None;
        }
        let prefix = match leaf.parent {
            Some(parent) => self.container_prefix(parent),
            None => UNRESOLVED_PREFIX.to_string(),
        };
        let transition = match parts.next() {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            None => Some(DEFAULT_TRANSITION.to_string()),
        };
        Some(AssetDirective {
            image: format!("{prefix} {name}"),
            transition,
        })
    }
}

fn name_matches_keyword(name: &str, keyword: &str) -> bool {
    name.split_whitespace()
        .next()
        .map(|first| {
            first.len() >= keyword.len()
                && first.is_char_boundary(keyword.len())
                && first[..keyword.len()].eq_ignore_ascii_case(keyword)
        })
        .unwrap_or(false)
}

/// Splits a container display name like `"Episode 3 The Heist"` (or
/// `"Episode3 The Heist"`) into its ordinal and free-text description.
/// A missing or non-numeric ordinal yields 0.
pub fn parse_titled_name(name: &str, keyword: &str) -> (u32, String) {
    let mut tokens: Vec<&str> = name.split_whitespace().collect();
    if !name_matches_keyword(name, keyword) {
        return (0, String::new());
    }

    let first = tokens[0];
    let ordinal: &str = if first.len() > keyword.len() {
        &first[keyword.len()..]
    } else if tokens.len() > 1 {
        tokens.remove(0);
        tokens[0]
    } else {
        ""
    };

    let num = if !ordinal.is_empty() && ordinal.chars().all(|c| c.is_ascii_digit()) {
        let parsed = ordinal.parse().unwrap_or(0);
        tokens.remove(0);
        parsed
    } else {
        0
    };

    (num, tokens.join(" "))
}

/// Rewrites an authored expression for the script runtime: boolean literals
/// are capitalized and the leading namespace segment (`Variables.`) dropped.
pub fn renpy_expression(raw: &str) -> String {
    let rewritten = raw.replace("true", "True").replace("false", "False");
    match rewritten.find('.') {
        Some(dot) => rewritten[dot + 1..].to_string(),
        None => rewritten,
    }
}

/// Menu jump target from a choice label: lowercased, spaces to underscores,
/// apostrophes removed, prefixed with the owning container's label prefix.
pub fn menu_tag(prefix: &str, label: &str) -> String {
    let slug = label.to_lowercase().replace(' ', "_").replace('\'', "");
    format!("{prefix}_{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titled_name_with_separate_ordinal() {
        assert_eq!(
            parse_titled_name("Episode 3 The Heist", "episode"),
            (3, "The Heist".to_string())
        );
    }

    #[test]
    fn titled_name_with_attached_ordinal() {
        assert_eq!(
            parse_titled_name("Scene12 Docks at Night", "scene"),
            (12, "Docks at Night".to_string())
        );
    }

    #[test]
    fn titled_name_without_ordinal() {
        assert_eq!(
            parse_titled_name("Snippet Farewell", "snippet"),
            (0, "Farewell".to_string())
        );
        assert_eq!(parse_titled_name("The Heist", "episode"), (0, String::new()));
    }

    #[test]
    fn expression_rewriting_strips_namespace_and_capitalizes() {
        assert_eq!(
            renpy_expression("Variables.game.met_aurora == true"),
            "game.met_aurora == True"
        );
        assert_eq!(
            renpy_expression("Variables.ep1.done = false"),
            "ep1.done = False"
        );
        assert_eq!(renpy_expression("plain_flag"), "plain_flag");
    }

    #[test]
    fn menu_tags_are_slugged() {
        assert_eq!(menu_tag("ep1sc01", "Don't Look"), "ep1sc01_dont_look");
        assert_eq!(menu_tag("ep1sc02", "Wave Back"), "ep1sc02_wave_back");
    }

    #[test]
    fn character_color_renders_as_hex() {
        let character = Character {
            id: "0x01".into(),
            name: "Aurora".into(),
            color: (255, 128, 0),
            abbrev: "au".into(),
        };
        assert_eq!(character.hex_color(), "#ff8000");
    }

    #[test]
    fn asset_directive_defaults_transition() {
        let directive = AssetDirective {
            image: "ep1sc01 dock".into(),
            transition: Some("dissolve".into()),
        };
        assert_eq!(directive.scene_line(), "scene ep1sc01 dock with dissolve");
        let bare = AssetDirective {
            image: "ep1sc01 dock".into(),
            transition: None,
        };
        assert_eq!(bare.scene_line(), "scene ep1sc01 dock");
    }
}
