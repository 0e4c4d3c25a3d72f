use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// A flow fragment as it appears in the export: identity, display name,
/// owning container, free text, and the flattened output-pin targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFragment {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub text: String,
    pub output_ids: Vec<String>,
}

/// A dialogue line. `menu_text` is only populated when the line doubles as
/// a menu choice; `stage_directions` carries the pipe-delimited image
/// annotation (`"<image> | <transition>"`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDialogue {
    pub id: String,
    pub parent_id: String,
    pub menu_text: String,
    pub stage_directions: String,
    pub speaker_id: String,
    pub text: String,
    pub output_ids: Vec<String>,
}

/// Conditions and instructions share a shape: a fragment plus the boolean
/// or assignment expression attached to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExpressionNode {
    pub fragment: RawFragment,
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCharacter {
    pub id: String,
    pub name: String,
    pub color: (u8, u8, u8),
    pub abbrev: String,
}

/// The full record population extracted from one export file. Classification
/// of generic flow fragments into game/episode/scene/snippet/code happens
/// downstream; this layer only separates the export's model types.
#[derive(Debug, Clone, Default)]
pub struct RawProject {
    pub characters: Vec<RawCharacter>,
    pub dialogues: Vec<RawDialogue>,
    pub conditions: Vec<RawExpressionNode>,
    pub instructions: Vec<RawExpressionNode>,
    pub hubs: Vec<RawFragment>,
    pub fragments: Vec<RawFragment>,
    pub unhandled: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct ExportDocument {
    #[serde(rename = "Packages", default)]
    packages: Vec<ExportPackage>,
}

#[derive(Debug, Deserialize)]
struct ExportPackage {
    #[serde(rename = "Models", default)]
    models: Vec<ExportModel>,
}

#[derive(Debug, Deserialize)]
struct ExportModel {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Properties")]
    properties: ExportProperties,
    #[serde(rename = "Template", default)]
    template: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct ExportProperties {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "DisplayName", default)]
    display_name: String,
    #[serde(rename = "Parent", default)]
    parent: String,
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "MenuText", default)]
    menu_text: String,
    #[serde(rename = "StageDirections", default)]
    stage_directions: String,
    #[serde(rename = "Speaker", default)]
    speaker: String,
    #[serde(rename = "Expression", default)]
    expression: String,
    #[serde(rename = "Color", default)]
    color: Option<ColorChannels>,
    #[serde(rename = "OutputPins", default)]
    output_pins: Vec<OutputPin>,
}

/// Channels are exported as 0..1 floats.
#[derive(Debug, Deserialize, Default)]
struct ColorChannels {
    #[serde(default)]
    r: f64,
    #[serde(default)]
    g: f64,
    #[serde(default)]
    b: f64,
}

#[derive(Debug, Deserialize, Default)]
struct OutputPin {
    #[serde(rename = "Connections", default)]
    connections: Vec<PinConnection>,
}

#[derive(Debug, Deserialize)]
struct PinConnection {
    #[serde(rename = "Target")]
    target: String,
}

const CHARACTER_TEMPLATE_PREFIX: &str = "DefaultMainCharacterTemplate";
const CHARACTER_FEATURE_PREFIX: &str = "DefaultBasicCharacterFeature";

impl RawProject {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read export file: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to parse export file: {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: ExportDocument = serde_json::from_str(raw)?;
        let mut project = RawProject::default();
        for package in document.packages {
            for model in package.models {
                project.classify_model(model);
            }
        }
        Ok(project)
    }

    fn classify_model(&mut self, model: ExportModel) {
        let ExportModel {
            kind,
            properties,
            template,
        } = model;
        match kind.as_str() {
            "DialogueFragment" => {
                let output_ids = flatten_output_pins(&properties.output_pins);
                self.dialogues.push(RawDialogue {
                    id: properties.id,
                    parent_id: properties.parent,
                    menu_text: properties.menu_text,
                    stage_directions: properties.stage_directions,
                    speaker_id: properties.speaker,
                    text: properties.text,
                    output_ids,
                });
            }
            "Condition" => {
                let expression = properties.expression.clone();
                self.conditions.push(RawExpressionNode {
                    fragment: fragment_from_properties(properties),
                    expression,
                });
            }
            "Instruction" => {
                let expression = properties.expression.clone();
                self.instructions.push(RawExpressionNode {
                    fragment: fragment_from_properties(properties),
                    expression,
                });
            }
            "Hub" => {
                self.hubs.push(fragment_from_properties(properties));
            }
            "FlowFragment" | "Dialogue" => {
                self.fragments.push(fragment_from_properties(properties));
            }
            other if other.starts_with(CHARACTER_TEMPLATE_PREFIX) => {
                match character_from_model(properties, template.as_ref()) {
                    Some(character) => self.characters.push(character),
                    None => {
                        eprintln!(
                            "[articy_formats] warning: character model {other} is missing its basic feature"
                        );
                        *self.unhandled.entry(kind.clone()).or_default() += 1;
                    }
                }
            }
            _ => {
                *self.unhandled.entry(kind.clone()).or_default() += 1;
            }
        }
    }
}

fn flatten_output_pins(pins: &[OutputPin]) -> Vec<String> {
    pins.iter()
        .flat_map(|pin| pin.connections.iter().map(|c| c.target.clone()))
        .collect()
}

fn fragment_from_properties(properties: ExportProperties) -> RawFragment {
    let output_ids = flatten_output_pins(&properties.output_pins);
    RawFragment {
        id: properties.id,
        name: properties.display_name,
        parent_id: properties.parent,
        text: properties.text,
        output_ids,
    }
}

fn character_from_model(
    properties: ExportProperties,
    template: Option<&BTreeMap<String, Value>>,
) -> Option<RawCharacter> {
    let abbrev = template?
        .iter()
        .find(|(key, _)| key.starts_with(CHARACTER_FEATURE_PREFIX))
        .and_then(|(_, feature)| feature.get("AbreviatedName"))
        .and_then(Value::as_str)?
        .to_string();
    let color = properties
        .color
        .map(|c| (scale_channel(c.r), scale_channel(c.g), scale_channel(c.b)))
        .unwrap_or_default();
    Some(RawCharacter {
        id: properties.id,
        name: properties.display_name,
        color,
        abbrev,
    })
}

fn scale_channel(channel: f64) -> u8 {
    (255.0 * channel.clamp(0.0, 1.0)).round() as u8
}
