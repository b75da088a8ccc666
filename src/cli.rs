use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};

use crate::directory::World;
use crate::model::MapDef;
use crate::render::MapRenderer;

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "topomap",
    about = "Render network topology maps with live status aggregation."
)]
pub struct RenderArgs {
    /// Path to the world snapshot (hosts, triggers, maps, history) as JSON.
    #[arg(short = 'w', long = "world")]
    world: PathBuf,

    /// Map to render, by numeric id or by name.
    #[arg(short = 'm', long = "map")]
    map: String,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Convenience flag to force PNG output without specifying --output-format.
    #[arg(long = "png", action = ArgAction::SetTrue, conflicts_with = "output_format")]
    png: bool,

    /// Scale factor when rasterizing PNG output.
    #[arg(long = "scale", default_value_t = 2.0)]
    scale: f32,

    /// Evaluation clock as a unix timestamp; defaults to the current time.
    #[arg(long = "now")]
    now: Option<i64>,

    /// Hide acknowledgement state everywhere.
    #[arg(long = "no-ack", action = ArgAction::SetTrue)]
    no_ack: bool,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Svg,
    Png,
    /// Structured scene description as JSON, for a client-side renderer.
    Scene,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "svg" => Some(OutputFormat::Svg),
            Some(ext) if ext == "png" => Some(OutputFormat::Png),
            Some(ext) if ext == "json" => Some(OutputFormat::Scene),
            _ => None,
        }
    }
}

pub fn run(cli: RenderArgs) -> Result<()> {
    let world = World::load(&cli.world)?;
    let map = find_map(&world, &cli.map)?;

    let format_preference = if cli.png {
        Some(OutputFormat::Png)
    } else {
        cli.output_format
    };
    let output_dest = parse_output(cli.output.as_deref())?;
    let format = determine_format(format_preference, &output_dest);

    if format == OutputFormat::Png && cli.scale <= 0.0 {
        bail!("--scale must be greater than zero for PNG output");
    }

    let now = match cli.now {
        Some(ts) => ts,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is set before the unix epoch")?
            .as_secs() as i64,
    };

    let renderer = MapRenderer::new(&world, &world, now).ack_enabled(!cli.no_ack);
    let output_bytes = match format {
        OutputFormat::Svg => renderer.render_svg(&map)?.into_bytes(),
        OutputFormat::Scene => {
            let scene = renderer.scene(&map)?;
            let mut json = serde_json::to_vec_pretty(&scene)?;
            json.push(b'\n');
            json
        }
        #[cfg(feature = "png")]
        OutputFormat::Png => renderer.render_png(&map, cli.scale)?,
        #[cfg(not(feature = "png"))]
        OutputFormat::Png => bail!("PNG output requires the 'png' feature to be enabled"),
    };

    write_output(output_dest, &output_bytes, cli.quiet)?;
    Ok(())
}

fn find_map(world: &World, selector: &str) -> Result<MapDef> {
    if let Ok(id) = selector.parse::<u64>() {
        if let Some(map) = world.maps.iter().find(|m| m.id == id) {
            return Ok(map.clone());
        }
    }
    world
        .maps
        .iter()
        .find(|m| m.name == selector)
        .cloned()
        .ok_or_else(|| anyhow!("no map matching '{selector}' in the world snapshot"))
}

fn parse_output(output: Option<&str>) -> Result<OutputDestination> {
    match output {
        Some("-") | None => Ok(OutputDestination::Stdout),
        Some(path_str) => Ok(OutputDestination::File(PathBuf::from(path_str))),
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    dest: &OutputDestination,
) -> OutputFormat {
    if let Some(format) = preference {
        return format;
    }
    match dest {
        OutputDestination::File(path) => OutputFormat::from_path(path).unwrap_or(OutputFormat::Svg),
        OutputDestination::Stdout => OutputFormat::Svg,
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Rendered map -> {}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension_when_unspecified() {
        let file = |name: &str| OutputDestination::File(PathBuf::from(name));
        assert_eq!(determine_format(None, &file("map.png")), OutputFormat::Png);
        assert_eq!(determine_format(None, &file("map.json")), OutputFormat::Scene);
        assert_eq!(determine_format(None, &file("map.unknown")), OutputFormat::Svg);
        assert_eq!(determine_format(None, &OutputDestination::Stdout), OutputFormat::Svg);
        assert_eq!(
            determine_format(Some(OutputFormat::Png), &file("map.svg")),
            OutputFormat::Png
        );
    }
}
