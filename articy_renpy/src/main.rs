use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use articy_formats::export::RawProject;
use articy_renpy::model::{ContainerId, ContainerKind, StoryGraph};
use articy_renpy::report::{build_outline, build_project_report, SkippedContainer};
use articy_renpy::resolve::resolve;
use articy_renpy::structure::{structure_container, ContainerScript};

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert an Articy:Draft JSON export into a Ren'Py script", long_about = None)]
struct Args {
    /// Path to the JSON export produced by Articy
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Optional path for the generated Ren'Py script
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Optional path for the image manifest referenced by the script
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Optional path to write a JSON report summarizing the conversion
    #[arg(long)]
    json_report: Option<PathBuf>,

    /// Print every generated script to stdout
    #[arg(long)]
    print_script: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = RawProject::from_path(&args.input)?;
    for (kind, count) in &raw.unhandled {
        eprintln!("[articy_renpy] warning: {count} unhandled model(s) of type {kind}");
    }

    let mut graph = StoryGraph::from_records(raw);
    resolve(&mut graph);

    println!(
        "Parsed {} characters, {} containers, {} leaf nodes",
        graph.characters.len(),
        graph.containers.len(),
        graph.leaves.len()
    );

    if !graph.characters.is_empty() {
        println!("\nCharacters:");
        let mut characters: Vec<_> = graph.characters.iter().collect();
        characters.sort_by(|a, b| a.name.cmp(&b.name));
        for character in characters {
            println!(
                "  - {} [{}] {}",
                character.name,
                character.abbrev,
                character.hex_color()
            );
        }
    }

    let outline = build_outline(&graph);
    if let Some(program) = graph.program {
        println!("\n{}", graph.container_title(program));
        for episode in &outline {
            println!("  {}", episode.title);
            for scene in &episode.scenes {
                println!("    {scene}");
            }
        }
    } else {
        eprintln!("[articy_renpy] warning: export has no top-level game fragment");
    }

    let (scripts, skipped) = structure_all(&graph);
    println!(
        "\nStructured {} container(s), skipped {}",
        scripts.len(),
        skipped.len()
    );

    if args.print_script {
        for script in &scripts {
            println!();
            for line in &script.lines {
                println!("{line}");
            }
        }
    }

    if let Some(path) = args.output.as_deref() {
        let mut body = String::new();
        for script in &scripts {
            for line in &script.lines {
                body.push_str(line);
                body.push('\n');
            }
            body.push('\n');
        }
        fs::write(path, body)
            .with_context(|| format!("failed to write script file: {}", path.display()))?;
        println!("[articy_renpy] wrote script to {}", path.display());
    }

    if let Some(path) = args.manifest.as_deref() {
        let mut manifest = String::new();
        for script in &scripts {
            if script.images.is_empty() {
                continue;
            }
            manifest.push_str(&format!("({}) {}\n", script.prefix, script.title));
            for image in &script.images {
                manifest.push_str(image);
                manifest.push('\n');
            }
            manifest.push('\n');
        }
        fs::write(path, manifest)
            .with_context(|| format!("failed to write image manifest: {}", path.display()))?;
        println!("[articy_renpy] wrote image manifest to {}", path.display());
    }

    if let Some(path) = args.json_report.as_deref() {
        let report = build_project_report(&graph, &scripts, &skipped);
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
        println!("[articy_renpy] wrote JSON report to {}", path.display());
    }

    Ok(())
}

/// Structures every scene, then every snippet. A malformed container is
/// reported and skipped; the rest of the run is unaffected.
fn structure_all(graph: &StoryGraph) -> (Vec<ContainerScript>, Vec<SkippedContainer>) {
    let mut scripts = Vec::new();
    let mut skipped = Vec::new();

    for kind in [ContainerKind::Scene, ContainerKind::Snippet] {
        for (idx, container) in graph.containers.iter().enumerate() {
            if container.kind != kind {
                continue;
            }
            match structure_container(graph, ContainerId(idx)) {
                Ok(script) => scripts.push(script),
                Err(error) => {
                    eprintln!("[articy_renpy] warning: skipping container: {error}");
                    skipped.push(SkippedContainer {
                        title: graph.container_title(ContainerId(idx)),
                        error: error.to_string(),
                    });
                }
            }
        }
    }

    (scripts, skipped)
}
