// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall collection in, consolidated centerline network out

use tracing::info;

use crate::catalog::{CatalogStats, SegmentCatalog};
use crate::config::PipelineConfig;
use crate::consolidator::{consolidate_network, ConsolidationStats};
use crate::matcher::{match_centerlines, CenterlineStats};
use crate::types::FeatureCollection;

/// Counts gathered from every stage of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub catalog: CatalogStats,
    pub centerline: CenterlineStats,
    pub consolidation: ConsolidationStats,
}

/// Result of [`extract_network`]
#[derive(Debug, Clone)]
pub struct NetworkResult {
    /// Consolidated centerline network
    pub network: FeatureCollection,
    pub stats: PipelineStats,
}

/// Run the whole pipeline over a wall collection
///
/// 1. Catalog the wall lines (duplicates are removed from `walls`)
/// 2. Pair opposing walls into midlines
/// 3. Merge near-duplicate midlines and weld their endpoints
pub fn extract_network(walls: &mut FeatureCollection, config: &PipelineConfig) -> NetworkResult {
    let mut catalog = SegmentCatalog::build(walls, config.centerline.line_min_length);
    let catalog_stats = catalog.stats().clone();

    let centerlines = match_centerlines(&mut catalog, &config.centerline);
    let mut network = centerlines.centerlines;
    let consolidation = consolidate_network(&mut network, &config.consolidation);

    info!(
        walls = catalog_stats.segments,
        midlines = centerlines.stats.midlines,
        network = network.len(),
        weld_groups = consolidation.weld_groups,
        "extracted centerline network"
    );

    NetworkResult {
        network,
        stats: PipelineStats {
            catalog: catalog_stats,
            centerline: centerlines.stats,
            consolidation,
        },
    }
}
