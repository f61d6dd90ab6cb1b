// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Passage centerline extraction
//!
//! This crate turns the digitized walls of a surveyed passage (two roughly
//! parallel lines per passage) into a connected centerline network:
//! 1. Cataloguing the wall lines (length filter, ids, duplicate removal)
//! 2. Pairing each wall with its nearest opposing wall and emitting midlines
//! 3. Merging near-duplicate midlines into one representative
//! 4. Welding nearby midline endpoints onto shared vertices
//!
//! # Usage
//!
//! ```rust,ignore
//! use passage_centerline::{extract_network, FeatureCollection, PipelineConfig};
//!
//! let mut walls = FeatureCollection::from_json(&std::fs::read_to_string("walls.geojson")?)?;
//! let result = extract_network(&mut walls, &PipelineConfig::default());
//! println!("{}", result.network.to_json(true)?);
//! ```

pub mod catalog;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod id;
pub mod matcher;
pub mod pipeline;
pub mod predicates;
pub mod spatial_index;
pub mod types;

// Re-export commonly used types and functions
pub use catalog::{CatalogStats, Segment, SegmentCatalog, SegmentId};
pub use config::PipelineConfig;
pub use consolidator::{
    consolidate_network, merge_line, merge_overlapping, weld_endpoints, ConsolidationConfig,
    ConsolidationStats, PointSample, WeldGroup, WeldMember,
};
pub use error::{Error, Result};
pub use id::generate_id;
pub use matcher::{
    generate_centerlines, match_centerlines, CenterlineConfig, CenterlineResult, CenterlineStats,
};
pub use pipeline::{extract_network, NetworkResult, PipelineStats};
pub use spatial_index::SpatialIndex;
pub use types::{BoundingBox, Feature, FeatureCollection, Geometry, Position, Properties};
