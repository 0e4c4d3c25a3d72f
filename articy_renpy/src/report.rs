use serde::Serialize;

use crate::model::{ContainerId, ContainerKind, LeafKind, NodeHandle, StoryGraph};
use crate::structure::ContainerScript;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub metadata: ReportMetadata,
    pub characters: Vec<CharacterReport>,
    pub outline: Vec<EpisodeOutline>,
    pub containers: Vec<ContainerReport>,
    pub skipped: Vec<SkippedContainer>,
}

impl ProjectReport {
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generator: String,
    pub character_count: usize,
    pub container_count: usize,
    pub dialogue_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacterReport {
    pub name: String,
    pub abbrev: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeOutline {
    pub title: String,
    pub scenes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    pub prefix: String,
    pub title: String,
    pub line_count: usize,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedContainer {
    pub title: String,
    pub error: String,
}

pub fn build_project_report(
    graph: &StoryGraph,
    scripts: &[ContainerScript],
    skipped: &[SkippedContainer],
) -> ProjectReport {
    let dialogue_count = graph
        .leaves
        .iter()
        .filter(|leaf| matches!(leaf.kind, LeafKind::Dialogue { .. }))
        .count();

    let mut characters: Vec<CharacterReport> = graph
        .characters
        .iter()
        .map(|character| CharacterReport {
            name: character.name.clone(),
            abbrev: character.abbrev.clone(),
            color: character.hex_color(),
        })
        .collect();
    characters.sort_by(|a, b| a.name.cmp(&b.name));

    ProjectReport {
        metadata: ReportMetadata {
            generator: format!("articy_renpy {}", env!("CARGO_PKG_VERSION")),
            character_count: graph.characters.len(),
            container_count: graph.containers.len(),
            dialogue_count,
        },
        characters,
        outline: build_outline(graph),
        containers: scripts
            .iter()
            .map(|script| ContainerReport {
                prefix: script.prefix.clone(),
                title: script.title.clone(),
                line_count: script.lines.len(),
                images: script.images.clone(),
            })
            .collect(),
        skipped: skipped.to_vec(),
    }
}

/// The program outline: episodes in entry order, each with its scenes in
/// entry order, following the resolved `first`/successor chains.
pub fn build_outline(graph: &StoryGraph) -> Vec<EpisodeOutline> {
    let Some(program) = graph.program else {
        return Vec::new();
    };

    let mut outline = Vec::new();
    let mut episode = graph.container(program).first;
    while let Some(NodeHandle::Container(episode_id)) = episode {
        outline.push(EpisodeOutline {
            title: graph.container_title(episode_id),
            scenes: collect_scene_titles(graph, episode_id),
        });
        episode = graph.next_of(NodeHandle::Container(episode_id));
    }
    outline
}

fn collect_scene_titles(graph: &StoryGraph, episode: ContainerId) -> Vec<String> {
    let mut titles = Vec::new();
    let mut scene = graph.container(episode).first;
    while let Some(NodeHandle::Container(scene_id)) = scene {
        if graph.container(scene_id).kind == ContainerKind::Scene {
            titles.push(format!(
                "({}) {}",
                graph.container_prefix(scene_id),
                graph.container_title(scene_id)
            ));
        }
        scene = graph.next_of(NodeHandle::Container(scene_id));
    }
    titles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use articy_formats::export::{RawCharacter, RawFragment, RawProject};
    use serde_json::Value;

    fn fragment(id: &str, name: &str, parent: &str, outputs: &[&str]) -> RawFragment {
        RawFragment {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent.to_string(),
            text: String::new(),
            output_ids: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn outline_follows_entry_chains() {
        let project = RawProject {
            fragments: vec![
                fragment("game", "Game Demo", "", &[]),
                fragment("ep1", "Episode 1 Pilot", "game", &["ep2"]),
                fragment("ep2", "Episode 2 Return", "game", &[]),
                fragment("sc2", "Scene 2 Docks", "ep1", &[]),
                fragment("sc1", "Scene 1 Arrival", "ep1", &["sc2"]),
            ],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);

        let outline = build_outline(&graph);
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].title, "Episode 1: Pilot");
        assert_eq!(
            outline[0].scenes,
            vec![
                "(ep1sc01) Scene 1: Arrival".to_string(),
                "(ep1sc02) Scene 2: Docks".to_string(),
            ]
        );
        assert_eq!(outline[1].title, "Episode 2: Return");
        assert!(outline[1].scenes.is_empty());
    }

    #[test]
    fn report_serializes_with_hex_colors() {
        let project = RawProject {
            characters: vec![RawCharacter {
                id: "char".into(),
                name: "Aurora".into(),
                color: (255, 128, 0),
                abbrev: "au".into(),
            }],
            fragments: vec![fragment("game", "Game Demo", "", &[])],
            ..RawProject::default()
        };
        let mut graph = StoryGraph::from_records(project);
        resolve(&mut graph);

        let report = build_project_report(&graph, &[], &[]);
        let raw = report.to_json_string().unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["characters"][0]["color"], "#ff8000");
        assert_eq!(parsed["metadata"]["character_count"], 1);
        assert!(parsed.get("skipped").is_some());
    }
}
