// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! passage-network - extract a centerline network from passage walls.
//!
//! Reads a GeoJSON FeatureCollection of wall lines and writes the
//! consolidated centerlines as another FeatureCollection.
//!
//! ```text
//! passage-network walls.geojson -o network.geojson --layer WALLS --max-width 8
//! RUST_LOG=passage_centerline=debug passage-network walls.geojson
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use passage_centerline::{extract_network, generate_centerlines, FeatureCollection, PipelineConfig};
use tracing_subscriber::EnvFilter;

/// Extract a centerline network from the two walls of surveyed passages.
#[derive(Parser, Debug)]
#[command(name = "passage-network")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON FeatureCollection with the wall lines
    input: PathBuf,

    /// Path to write the network to, or "-" for stdout
    #[arg(short = 'o', long, default_value = "-")]
    output: String,

    /// JSON configuration file; flags below override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Only use features whose "layer" property equals this name
    #[arg(short = 'l', long)]
    layer: Option<String>,

    // === Centerline options ===
    /// Sideways reach of the partner search
    #[arg(long = "search-extend")]
    search_extend: Option<f64>,

    /// Walls at or beyond this distance are not paired
    #[arg(long = "max-width")]
    max_width: Option<f64>,

    /// Walls at or below this distance are not paired
    #[arg(long = "min-width")]
    min_width: Option<f64>,

    /// Wall lines shorter than this are ignored
    #[arg(long = "min-length")]
    min_length: Option<f64>,

    // === Consolidation options ===
    /// Neighbourhood searched when merging and welding
    #[arg(long = "search-radius")]
    search_radius: Option<f64>,

    /// Lines closer than this get their endpoints welded
    #[arg(long = "weld-distance")]
    weld_distance: Option<f64>,

    /// Write the raw midlines without merging or welding
    #[arg(long = "centerlines-only")]
    centerlines_only: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let c = &mut config.centerline;
        if let Some(v) = self.search_extend {
            c.search_extend = v;
        }
        if let Some(v) = self.max_width {
            c.max_width = v;
        }
        if let Some(v) = self.min_width {
            c.min_width = v;
        }
        if let Some(v) = self.min_length {
            c.line_min_length = v;
        }

        let m = &mut config.consolidation;
        if let Some(v) = self.search_radius {
            m.search_radius = v;
        }
        if let Some(v) = self.weld_distance {
            m.distance = v;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.pipeline_config()?;

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let mut walls = FeatureCollection::from_json(&text)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;

    if let Some(layer) = &args.layer {
        walls.retain_layer(layer);
        tracing::info!(
            layer = %layer,
            features = walls.len(),
            lines = walls.line_count(),
            "filtered by layer"
        );
    }

    let network = if args.centerlines_only {
        let result = generate_centerlines(&mut walls, &config.centerline);
        tracing::info!(midlines = result.stats.midlines, "generated centerlines");
        result.centerlines
    } else {
        let result = extract_network(&mut walls, &config);
        tracing::debug!(stats = ?result.stats, "pipeline finished");
        result.network
    };

    let json = network.to_json(args.pretty)?;
    if args.output == "-" {
        println!("{json}");
    } else {
        std::fs::write(&args.output, json)
            .with_context(|| format!("failed to write {}", args.output))?;
        tracing::info!(path = %args.output, features = network.len(), "wrote network");
    }

    Ok(())
}
