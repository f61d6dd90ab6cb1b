// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Centerline matcher: pairs opposing wall segments and emits their midlines
//!
//! For every catalog segment, in catalog order:
//! 1. search sideways from both endpoints for candidate partners,
//! 2. keep candidates that run alongside, are parallel, and sit between the
//!    minimum and maximum passage width,
//! 3. take the nearest one (ties go to the earlier catalog entry),
//! 4. emit the midline unless the pair was already matched both ways.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::catalog::{Segment, SegmentCatalog, SegmentId};
use crate::id::generate_id;
use crate::predicates::{endpoint_distances, is_parallel, segments_run_alongside};
use crate::spatial_index::SpatialIndex;
use crate::types::{BoundingBox, Feature, FeatureCollection, Position};

/// Parameters for centerline generation
///
/// The matcher takes these as given. `min_width < max_width` is assumed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CenterlineConfig {
    /// Sideways reach of the partner search from each endpoint
    pub search_extend: f64,
    /// Partners at or beyond this distance are ignored
    pub max_width: f64,
    /// Partners at or below this distance are ignored
    pub min_width: f64,
    /// Shorter wall segments are left out of the catalog
    pub line_min_length: f64,
}

impl Default for CenterlineConfig {
    fn default() -> Self {
        Self {
            search_extend: 10.0,
            max_width: 10.0,
            min_width: 1.5,
            line_min_length: 5.0,
        }
    }
}

/// Statistics from one matcher pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CenterlineStats {
    pub segments: usize,
    pub candidates_considered: usize,
    pub midlines: usize,
    pub already_paired: usize,
    pub unmatched: usize,
}

/// Midlines produced by a matcher pass
#[derive(Debug, Clone)]
pub struct CenterlineResult {
    pub centerlines: FeatureCollection,
    pub stats: CenterlineStats,
}

/// Build a catalog from `collection` and match it
///
/// Duplicate wall features are removed from `collection` as a side effect.
pub fn generate_centerlines(
    collection: &mut FeatureCollection,
    config: &CenterlineConfig,
) -> CenterlineResult {
    let mut catalog = SegmentCatalog::build(collection, config.line_min_length);
    match_centerlines(&mut catalog, config)
}

/// Pair the segments of `catalog` and return one midline per new pair
///
/// Pairings are recorded on the catalog, so running this again over the same
/// catalog yields nothing for pairs that were already matched both ways.
pub fn match_centerlines(
    catalog: &mut SegmentCatalog,
    config: &CenterlineConfig,
) -> CenterlineResult {
    let index = catalog.segment_index();
    let mut centerlines = FeatureCollection::new();
    let mut stats = CenterlineStats {
        segments: catalog.len(),
        ..Default::default()
    };

    for id in 0..catalog.len() {
        let id = SegmentId(id);
        let candidates = lateral_candidates(catalog.get(id), &index, config.search_extend);
        stats.candidates_considered += candidates.len();

        let Some(partner) = select_partner(catalog, id, &candidates, config) else {
            stats.unmatched += 1;
            continue;
        };

        let source = catalog.get(id);
        let target = catalog.get(partner);
        if source.is_paired_with(partner) && target.is_paired_with(id) {
            stats.already_paired += 1;
            continue;
        }

        trace!(source = %source.id, partner = %target.id, "paired walls");
        let line = midline(source, target);
        catalog.mark_paired(id, partner);

        let mut feature = Feature::line(line.to_vec());
        feature.id = Some(generate_id());
        centerlines.push(feature);
        stats.midlines += 1;
    }

    debug!(
        segments = stats.segments,
        midlines = stats.midlines,
        already_paired = stats.already_paired,
        unmatched = stats.unmatched,
        "matched centerlines"
    );

    CenterlineResult { centerlines, stats }
}

/// Box spanned by `p` offset `extend` to the left and right of `normal`
fn lateral_search_box(p: &Point2<f64>, normal: &Vector2<f64>, extend: f64) -> BoundingBox {
    let reach = normal * extend;
    let left = p + Rotation2::new(FRAC_PI_2) * reach;
    let right = p + Rotation2::new(-FRAC_PI_2) * reach;
    BoundingBox::from_points(&left, &right)
}

/// Index hits from both endpoints' lateral boxes, in catalog order
fn lateral_candidates(
    segment: &Segment,
    index: &SpatialIndex<SegmentId>,
    extend: f64,
) -> SmallVec<[SegmentId; 8]> {
    let mut hits: SmallVec<[SegmentId; 8]> = SmallVec::new();
    for p in segment.line() {
        let area = lateral_search_box(&p, &segment.normal, extend);
        hits.extend(index.search_box(&area));
    }
    hits.sort_unstable();
    hits.dedup();
    hits
}

/// Nearest admissible partner of `id`, earliest in catalog order on ties
fn select_partner(
    catalog: &SegmentCatalog,
    id: SegmentId,
    candidates: &[SegmentId],
    config: &CenterlineConfig,
) -> Option<SegmentId> {
    let source = catalog.get(id);
    let source_line = source.line();
    let mut best: Option<(SegmentId, f64)> = None;

    for &candidate_id in candidates {
        if candidate_id == id {
            continue;
        }
        let candidate = catalog.get(candidate_id);
        let candidate_line = candidate.line();

        if !segments_run_alongside(&source_line, &candidate_line) {
            continue;
        }
        if !is_parallel(&source.normal, &candidate.normal) {
            continue;
        }

        let (d1, d2) = endpoint_distances(&source_line, &candidate_line);
        let dis = d1.min(d2);
        if dis <= config.min_width || dis >= config.max_width {
            continue;
        }
        if best.map_or(true, |(_, min)| dis < min) {
            best = Some((candidate_id, dis));
        }
    }

    best.map(|(candidate_id, _)| candidate_id)
}

/// Line through the midpoints of facing endpoints
///
/// Anti-parallel partners pair start with end; otherwise endpoints pair by
/// index.
fn midline(source: &Segment, partner: &Segment) -> [Position; 2] {
    let (first, second) = if source.normal.dot(&partner.normal) < 0.0 {
        (partner.end, partner.start)
    } else {
        (partner.start, partner.end)
    };
    [
        midpoint(&source.start, &first),
        midpoint(&source.end, &second),
    ]
}

fn midpoint(a: &Position, b: &Position) -> Position {
    let z = match (a.z, b.z) {
        (Some(za), Some(zb)) => Some((za + zb) / 2.0),
        _ => None,
    };
    Position {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
        z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wall(x1: f64, y1: f64, x2: f64, y2: f64) -> Feature {
        Feature::line(vec![Position::new(x1, y1), Position::new(x2, y2)])
    }

    fn walls(features: Vec<Feature>) -> FeatureCollection {
        features.into_iter().collect()
    }

    fn config(min_width: f64, max_width: f64) -> CenterlineConfig {
        CenterlineConfig {
            search_extend: 5.0,
            max_width,
            min_width,
            line_min_length: 0.5,
        }
    }

    fn endpoints(feature: &Feature) -> [Position; 2] {
        let coords = feature.line_coordinates().unwrap();
        [coords[0], coords[1]]
    }

    #[test]
    fn test_lateral_search_box() {
        let bbox = lateral_search_box(&Point2::new(3.0, 1.0), &Vector2::new(1.0, 0.0), 5.0);
        assert_relative_eq!(bbox.min_x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(bbox.max_x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(bbox.min_y, -4.0, epsilon = 1e-12);
        assert_relative_eq!(bbox.max_y, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_width_gating() {
        let mut collection = walls(vec![wall(0.0, 0.0, 1.0, 0.0), wall(0.0, 2.0, 1.0, 2.0)]);
        let result = generate_centerlines(&mut collection, &config(1.0, 3.0));
        assert_eq!(result.centerlines.len(), 1);

        let mut collection = walls(vec![wall(0.0, 0.0, 1.0, 0.0), wall(0.0, 2.0, 1.0, 2.0)]);
        let result = generate_centerlines(&mut collection, &config(1.0, 1.5));
        assert!(result.centerlines.is_empty());
        assert_eq!(result.stats.unmatched, 2);

        // The minimum width is exclusive as well
        let mut collection = walls(vec![wall(0.0, 0.0, 1.0, 0.0), wall(0.0, 2.0, 1.0, 2.0)]);
        let result = generate_centerlines(&mut collection, &config(2.0, 3.0));
        assert!(result.centerlines.is_empty());
    }

    #[test]
    fn test_anti_parallel_walls_pair_opposite_ends() {
        let mut collection = walls(vec![wall(0.0, 0.0, 10.0, 0.0), wall(10.0, 2.0, 0.0, 2.0)]);
        let result = generate_centerlines(&mut collection, &config(0.5, 5.0));

        assert_eq!(result.centerlines.len(), 1);
        let [a, b] = endpoints(&result.centerlines.features[0]);
        assert_eq!(a, Position::new(0.0, 1.0));
        assert_eq!(b, Position::new(10.0, 1.0));
    }

    #[test]
    fn test_nearest_partner_wins() {
        // Wall at y=0 with candidates at y=3 and y=2; the y=3 wall also
        // pairs with the y=2 wall from its own side.
        let mut collection = walls(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            wall(0.0, 3.0, 10.0, 3.0),
            wall(0.0, 2.0, 10.0, 2.0),
        ]);
        let mut catalog = SegmentCatalog::build(&mut collection, 1.0);
        let result = match_centerlines(&mut catalog, &config(0.5, 5.0));

        let first = endpoints(&result.centerlines.features[0]);
        assert_relative_eq!(first[0].y, 1.0);
        assert!(catalog.get(SegmentId(0)).is_paired_with(SegmentId(2)));
        assert!(!catalog.get(SegmentId(0)).is_paired_with(SegmentId(1)));
    }

    #[test]
    fn test_equal_distance_tie_goes_to_catalog_order() {
        let mut collection = walls(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            wall(0.0, -2.0, 10.0, -2.0),
            wall(0.0, 2.0, 10.0, 2.0),
        ]);
        let mut catalog = SegmentCatalog::build(&mut collection, 1.0);
        let result = match_centerlines(&mut catalog, &config(0.5, 5.0));

        let first = endpoints(&result.centerlines.features[0]);
        assert_relative_eq!(first[0].y, -1.0);
        assert!(catalog.get(SegmentId(0)).is_paired_with(SegmentId(1)));
    }

    #[test]
    fn test_pairing_is_symmetric_and_not_repeated() {
        let mut collection = walls(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            wall(0.0, 2.0, 10.0, 2.0),
            wall(20.0, 0.0, 30.0, 0.0),
            wall(20.0, 3.0, 30.0, 3.0),
        ]);
        let mut catalog = SegmentCatalog::build(&mut collection, 1.0);
        let cfg = config(0.5, 5.0);

        let first = match_centerlines(&mut catalog, &cfg);
        assert_eq!(first.centerlines.len(), 2);
        assert_eq!(first.stats.already_paired, 2);

        for (a, segment) in catalog.iter() {
            for &b in &segment.paired_with {
                assert!(catalog.get(b).is_paired_with(a));
            }
        }

        let second = match_centerlines(&mut catalog, &cfg);
        assert!(second.centerlines.is_empty());
        assert_eq!(second.stats.already_paired, 4);
    }

    #[test]
    fn test_perpendicular_and_offset_walls_do_not_pair() {
        let mut collection = walls(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            // Inside the first wall's search box but perpendicular
            wall(10.0, 1.0, 10.0, 4.0),
            // Parallel and in range but starts where the first wall ends
            wall(10.0, 2.0, 18.0, 2.0),
        ]);
        let result = generate_centerlines(&mut collection, &config(0.5, 5.0));
        assert!(result.centerlines.is_empty());
    }

    #[test]
    fn test_midline_carries_mean_z() {
        let mut collection = walls(vec![
            Feature::line(vec![Position::with_z(0.0, 0.0, 2.0), Position::with_z(10.0, 0.0, 4.0)]),
            Feature::line(vec![Position::with_z(0.0, 2.0, 4.0), Position::with_z(10.0, 2.0, 6.0)]),
        ]);
        let result = generate_centerlines(&mut collection, &config(0.5, 5.0));

        let [a, b] = endpoints(&result.centerlines.features[0]);
        assert_eq!(a.z, Some(3.0));
        assert_eq!(b.z, Some(5.0));
    }

    #[test]
    fn test_midlines_get_fresh_ids_and_no_properties() {
        let mut collection = walls(vec![wall(0.0, 0.0, 10.0, 0.0), wall(0.0, 2.0, 10.0, 2.0)]);
        collection.features[0]
            .properties
            .insert("layer".into(), serde_json::Value::String("walls".into()));

        let result = generate_centerlines(&mut collection, &config(0.5, 5.0));
        let midline = &result.centerlines.features[0];

        assert_eq!(midline.id.as_ref().map(String::len), Some(32));
        assert_ne!(midline.id, collection.features[0].id);
        assert!(midline.properties.is_empty());
        assert!(midline.bbox.is_some());
    }
}
