// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network consolidation: merge near-duplicate lines, then weld endpoints
//!
//! Stage A folds lines that run alongside each other within
//! [`MERGE_DISTANCE`] into one representative per group. Stage B snaps the
//! endpoints of nearby parallel lines that do not run alongside each other
//! onto one shared averaged location, so the centerlines form a connected
//! network.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::catalog::{Segment, SegmentCatalog, SegmentId};
use crate::predicates::{endpoint_distances, is_parallel, perpendicular_foot, segments_run_alongside};
use crate::spatial_index::SpatialIndex;
use crate::types::{BoundingBox, FeatureCollection, Position};

/// Lines are merged when they sit closer than this to each other
pub const MERGE_DISTANCE: f64 = 1.0;

/// Parameters for network consolidation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Half-width of the neighbourhood searched around a line or endpoint
    pub search_radius: f64,
    /// Lines closer than this have their nearby endpoints welded
    pub distance: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            search_radius: 10.0,
            distance: 1.0,
        }
    }
}

/// Statistics from one consolidation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationStats {
    /// Exact duplicates dropped while cataloguing
    pub duplicates_removed: usize,
    /// Lines folded into another line's representative
    pub merged_away: usize,
    pub weld_groups: usize,
    pub welded_endpoints: usize,
}

/// One endpoint of a catalog segment
#[derive(Debug, Clone, Copy)]
pub struct PointSample {
    pub segment: SegmentId,
    /// 0 for the start point, 1 for the end point
    pub endpoint: usize,
    pub location: Point2<f64>,
    /// Direction of the owning segment
    pub normal: Vector2<f64>,
    pub visited: bool,
}

/// A segment endpoint taking part in a weld
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeldMember {
    pub segment: SegmentId,
    pub endpoint: usize,
}

/// Endpoints snapped to one shared location
#[derive(Debug, Clone)]
pub struct WeldGroup {
    /// The source endpoint first, then its partners
    pub members: SmallVec<[WeldMember; 4]>,
    pub location: Point2<f64>,
}

/// Run both consolidation stages over `collection` in place
///
/// Non-line features pass through untouched.
pub fn consolidate_network(
    collection: &mut FeatureCollection,
    config: &ConsolidationConfig,
) -> ConsolidationStats {
    let mut stats = merge_overlapping(collection, config);

    let mut catalog = SegmentCatalog::build(collection, 0.0);
    stats.duplicates_removed += catalog.stats().removed_duplicate;

    let groups = weld_endpoints(&mut catalog, config);
    catalog.write_back(collection);

    stats.weld_groups = groups.len();
    stats.welded_endpoints = groups.iter().map(|g| g.members.len()).sum();

    debug!(
        duplicates = stats.duplicates_removed,
        merged_away = stats.merged_away,
        weld_groups = stats.weld_groups,
        welded_endpoints = stats.welded_endpoints,
        "consolidated network"
    );

    stats
}

/// Stage A: fold lines that run alongside each other into one line
///
/// Segments are visited in catalog order. Each unconsumed segment collects
/// every unconsumed neighbour that qualifies (see [`should_merge`]); the
/// group keeps the first segment's feature with the folded geometry and the
/// other members' features are removed.
pub fn merge_overlapping(
    collection: &mut FeatureCollection,
    config: &ConsolidationConfig,
) -> ConsolidationStats {
    let catalog = SegmentCatalog::build(collection, 0.0);
    let index = catalog.segment_index();

    let mut consumed = vec![false; catalog.len()];
    let mut removed = vec![false; collection.len()];
    let mut representatives: Vec<(usize, [Position; 2])> = Vec::new();
    let mut merged_away = 0;

    for (id, segment) in catalog.iter() {
        if consumed[id.index()] {
            continue;
        }
        consumed[id.index()] = true;

        let mut hits = index.search_box(&segment.bbox.expanded(config.search_radius));
        hits.sort_unstable();

        let mut representative = segment.positions();
        let mut members = 1;
        for other_id in hits {
            if consumed[other_id.index()] {
                continue;
            }
            let other = catalog.get(other_id);
            if !should_merge(segment, other) {
                continue;
            }

            consumed[other_id.index()] = true;
            removed[other.feature] = true;
            representative = merge_line(&representative, &other.positions());
            members += 1;
        }

        if members > 1 {
            trace!(segment = %segment.id, members, "merged overlapping lines");
            representatives.push((segment.feature, representative));
            merged_away += members - 1;
        }
    }

    for (feature, line) in representatives {
        let feature = &mut collection.features[feature];
        if let Some(head) = feature
            .geometry
            .as_line_mut()
            .and_then(|coords| coords.get_mut(..2))
        {
            head.copy_from_slice(&line);
        }
        feature.refresh_bbox();
    }

    let mut flags = removed.into_iter();
    collection
        .features
        .retain(|_| !flags.next().unwrap_or(false));

    ConsolidationStats {
        duplicates_removed: catalog.stats().removed_duplicate,
        merged_away,
        ..Default::default()
    }
}

/// Whether `b` should be folded into `a`
///
/// The lines must run alongside each other and be parallel, and one of them
/// must lie entirely within [`MERGE_DISTANCE`] of the other. Both checks
/// run in both directions, wider than a one-way test from `a`, so a short
/// line contained in a long one merges whichever of the two comes first.
fn should_merge(a: &Segment, b: &Segment) -> bool {
    let (la, lb) = (a.line(), b.line());
    if !(segments_run_alongside(&la, &lb) || segments_run_alongside(&lb, &la)) {
        return false;
    }
    if !is_parallel(&a.normal, &b.normal) {
        return false;
    }

    let (b1, b2) = endpoint_distances(&lb, &la);
    let (a1, a2) = endpoint_distances(&la, &lb);
    b1.max(b2).min(a1.max(a2)) < MERGE_DISTANCE
}

/// Representative line of two nearly coincident lines
///
/// Each vertex is moved halfway towards its perpendicular foot on the other
/// line; the longest of the six lines between those four points wins, the
/// first one on ties. Every point keeps the Z of the vertex it came from.
pub fn merge_line(l1: &[Position; 2], l2: &[Position; 2]) -> [Position; 2] {
    let [v11, v12] = l1;
    let [v21, v22] = l2;

    let halfway = |v: &Position, line: &[Position; 2]| {
        let p = v.to_nalgebra();
        let foot = perpendicular_foot(&p, &line[0].to_nalgebra(), &line[1].to_nalgebra());
        Position::from_nalgebra(&nalgebra::center(&p, &foot), v.z)
    };

    let points = [
        halfway(v11, l2),
        halfway(v12, l2),
        halfway(v21, l1),
        halfway(v22, l1),
    ];
    const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

    let mut best = PAIRS[0];
    let mut best_length = 0.0;
    for (a, b) in PAIRS {
        let length = points[a].distance_to(&points[b]);
        if length > best_length {
            best_length = length;
            best = (a, b);
        }
    }

    [points[best.0], points[best.1]]
}

/// Two samples per catalog segment, start then end, in catalog order
pub fn point_samples(catalog: &SegmentCatalog) -> Vec<PointSample> {
    catalog
        .iter()
        .flat_map(|(id, segment)| {
            segment
                .line()
                .into_iter()
                .enumerate()
                .map(move |(endpoint, location)| PointSample {
                    segment: id,
                    endpoint,
                    location,
                    normal: segment.normal,
                    visited: false,
                })
        })
        .collect()
}

/// Stage B: weld nearby endpoints of distinct parallel lines
///
/// Samples are processed in creation order. Each unvisited sample gathers
/// its partners (see [`weld_partners`]), and the whole group moves to the
/// mean of their locations. Every member is then visited, so each endpoint
/// is welded at most once per pass. Endpoints move in X/Y only.
pub fn weld_endpoints(
    catalog: &mut SegmentCatalog,
    config: &ConsolidationConfig,
) -> Vec<WeldGroup> {
    let mut samples = point_samples(catalog);
    let index = SpatialIndex::bulk_load(
        samples
            .iter()
            .enumerate()
            .map(|(i, s)| (BoundingBox::from_points(&s.location, &s.location), i)),
    );

    let mut groups = Vec::new();
    for source in 0..samples.len() {
        if samples[source].visited {
            continue;
        }

        let area = BoundingBox::around(&samples[source].location, config.search_radius);
        let mut hits = index.search_box(&area);
        hits.sort_unstable();

        let partners = weld_partners(catalog, &samples, source, &hits, config.distance);
        samples[source].visited = true;
        if partners.is_empty() {
            continue;
        }

        let mut sum = samples[source].location.coords;
        for &j in &partners {
            sum += samples[j].location.coords;
        }
        let location = Point2::from(sum / (partners.len() + 1) as f64);

        let mut members = SmallVec::new();
        for k in std::iter::once(source).chain(partners) {
            let sample = &mut samples[k];
            sample.location = location;
            sample.visited = true;
            catalog
                .get_mut(sample.segment)
                .move_endpoint(sample.endpoint, &location);
            members.push(WeldMember {
                segment: sample.segment,
                endpoint: sample.endpoint,
            });
        }

        trace!(x = location.x, y = location.y, members = members.len(), "welded endpoints");
        groups.push(WeldGroup { members, location });
    }

    debug!(samples = samples.len(), groups = groups.len(), "welded endpoints");
    groups
}

/// Samples that weld with `source`, at most one per other segment
///
/// A candidate must be unvisited, belong to another segment that does not
/// run alongside the source segment, be parallel to it, and its segment must
/// come within `distance` of the source sample's own endpoint. The far end
/// of a short source segment is never pulled onto a neighbour. When both
/// ends of a segment qualify, the one nearer the source sample is kept.
fn weld_partners(
    catalog: &SegmentCatalog,
    samples: &[PointSample],
    source: usize,
    hits: &[usize],
    distance: f64,
) -> SmallVec<[usize; 4]> {
    let src = &samples[source];
    let src_line = catalog.get(src.segment).line();
    let mut nearest: SmallVec<[(SegmentId, usize, f64); 4]> = SmallVec::new();

    for &j in hits {
        let other = &samples[j];
        if other.visited || other.segment == src.segment {
            continue;
        }

        let other_line = catalog.get(other.segment).line();
        if segments_run_alongside(&src_line, &other_line) {
            continue;
        }
        if !is_parallel(&src.normal, &other.normal) {
            continue;
        }
        let (d1, d2) = endpoint_distances(&src_line, &other_line);
        let own = if src.endpoint == 0 { d1 } else { d2 };
        if own >= distance {
            continue;
        }

        let gap = nalgebra::distance(&src.location, &other.location);
        match nearest.iter_mut().find(|(segment, _, _)| *segment == other.segment) {
            Some(entry) => {
                if gap < entry.2 {
                    *entry = (other.segment, j, gap);
                }
            }
            None => nearest.push((other.segment, j, gap)),
        }
    }

    nearest.into_iter().map(|(_, j, _)| j).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Feature, Geometry};
    use approx::assert_relative_eq;

    fn wall(x1: f64, y1: f64, x2: f64, y2: f64) -> Feature {
        Feature::line(vec![Position::new(x1, y1), Position::new(x2, y2)])
    }

    fn lines(features: Vec<Feature>) -> FeatureCollection {
        features.into_iter().collect()
    }

    fn endpoints(feature: &Feature) -> [Position; 2] {
        let coords = feature.line_coordinates().unwrap();
        [coords[0], coords[1]]
    }

    #[test]
    fn test_merge_identical_lines_keeps_endpoints() {
        let line = [Position::new(0.0, 0.0), Position::new(10.0, 0.0)];
        assert_eq!(merge_line(&line, &line), line);
    }

    #[test]
    fn test_merge_line_averages_offset_lines() {
        let l1 = [Position::new(0.0, 0.0), Position::new(10.0, 0.0)];
        let l2 = [Position::new(2.0, 0.4), Position::new(8.0, 0.4)];

        let [a, b] = merge_line(&l1, &l2);
        assert_relative_eq!(a.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(a.y, 0.2, epsilon = 1e-12);
        assert_relative_eq!(b.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(b.y, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_merge_line_keeps_vertex_z() {
        let l1 = [Position::with_z(0.0, 0.0, 3.0), Position::with_z(10.0, 0.0, 4.0)];
        let l2 = [Position::new(0.0, 0.2), Position::new(10.0, 0.2)];

        let [a, b] = merge_line(&l1, &l2);
        assert_eq!(a.z, Some(3.0));
        assert_eq!(b.z, Some(4.0));
    }

    #[test]
    fn test_contained_line_is_merged_either_order() {
        for features in [
            vec![wall(0.0, 0.0, 10.0, 0.0), wall(2.0, 0.3, 8.0, 0.3)],
            vec![wall(2.0, 0.3, 8.0, 0.3), wall(0.0, 0.0, 10.0, 0.0)],
        ] {
            let mut collection = lines(features);
            let stats = merge_overlapping(&mut collection, &ConsolidationConfig::default());

            assert_eq!(stats.merged_away, 1);
            assert_eq!(collection.len(), 1);
            let [a, b] = endpoints(&collection.features[0]);
            assert_relative_eq!(a.x, 0.0, epsilon = 1e-12);
            assert_relative_eq!(a.y, 0.15, epsilon = 1e-12);
            assert_relative_eq!(b.x, 10.0, epsilon = 1e-12);
            assert_relative_eq!(b.y, 0.15, epsilon = 1e-12);
            assert_eq!(collection.features[0].bbox.unwrap().max_corner()[0], 10.0);
        }
    }

    #[test]
    fn test_distant_or_crossing_lines_are_not_merged() {
        let mut collection = lines(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            // Parallel and alongside but too far away
            wall(0.0, 2.0, 10.0, 2.0),
            // Crossing at a right angle
            wall(5.0, -3.0, 5.0, 3.0),
        ]);
        let stats = merge_overlapping(&mut collection, &ConsolidationConfig::default());

        assert_eq!(stats.merged_away, 0);
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_identical_lines_collapse_to_one() {
        let mut collection = lines(vec![wall(0.0, 0.0, 10.0, 0.0), wall(10.0, 0.0, 0.0, 0.0)]);
        let stats = consolidate_network(&mut collection, &ConsolidationConfig::default());

        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_weld_nearby_endpoints() {
        let mut collection = lines(vec![wall(0.0, 0.0, 10.0, 0.0), wall(10.4, 0.2, 20.0, 0.2)]);
        let stats = consolidate_network(&mut collection, &ConsolidationConfig::default());

        assert_eq!(stats.weld_groups, 1);
        assert_eq!(stats.welded_endpoints, 2);

        let [_, end] = endpoints(&collection.features[0]);
        let [start, _] = endpoints(&collection.features[1]);
        assert_eq!(end, start);
        assert_relative_eq!(end.x, 10.2, epsilon = 1e-12);
        assert_relative_eq!(end.y, 0.1, epsilon = 1e-12);
        // The far ends stay put
        assert_eq!(endpoints(&collection.features[0])[0], Position::new(0.0, 0.0));
        assert_eq!(endpoints(&collection.features[1])[1], Position::new(20.0, 0.2));
    }

    #[test]
    fn test_weld_group_members() {
        let mut collection = lines(vec![wall(0.0, 0.0, 10.0, 0.0), wall(10.4, 0.2, 20.0, 0.2)]);
        let mut catalog = SegmentCatalog::build(&mut collection, 0.0);
        let groups = weld_endpoints(&mut catalog, &ConsolidationConfig::default());

        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].members.as_slice(),
            &[
                WeldMember { segment: SegmentId(0), endpoint: 1 },
                WeldMember { segment: SegmentId(1), endpoint: 0 },
            ]
        );
        assert_eq!(catalog.get(SegmentId(0)).end, catalog.get(SegmentId(1)).start);
    }

    #[test]
    fn test_perpendicular_and_alongside_endpoints_are_not_welded() {
        let mut collection = lines(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            // Perpendicular, starting next to the first line's end
            wall(10.3, 0.0, 10.3, 10.0),
            // Parallel and alongside the first line, too far to merge
            wall(5.0, 0.5, 15.0, 0.5),
        ]);
        let before = collection.clone();
        let mut catalog = SegmentCatalog::build(&mut collection, 0.0);
        let groups = weld_endpoints(&mut catalog, &ConsolidationConfig::default());

        assert!(groups.is_empty());
        catalog.write_back(&mut collection);
        for (after, before) in collection.features.iter().zip(&before.features) {
            assert_eq!(after.geometry, before.geometry);
        }
    }

    #[test]
    fn test_weld_keeps_z() {
        let mut collection = lines(vec![
            Feature::line(vec![Position::with_z(0.0, 0.0, 1.0), Position::with_z(10.0, 0.0, 2.0)]),
            Feature::line(vec![Position::with_z(10.4, 0.2, 5.0), Position::with_z(20.0, 0.2, 6.0)]),
        ]);
        consolidate_network(&mut collection, &ConsolidationConfig::default());

        assert_eq!(endpoints(&collection.features[0])[1].z, Some(2.0));
        assert_eq!(endpoints(&collection.features[1])[0].z, Some(5.0));
    }

    #[test]
    fn test_far_end_of_short_line_stays_put() {
        // The start of the first line is within search range of the second
        // line but more than the weld distance away from it
        let mut collection = lines(vec![
            wall(0.28, 0.19, 4.2, 0.19),
            wall(4.6, -0.1, 11.18, -0.1),
            wall(11.7, 0.04, 17.1, 0.04),
        ]);
        let config = ConsolidationConfig::default();
        let stats = consolidate_network(&mut collection, &config);

        assert_eq!(stats.merged_away, 0);
        assert_eq!(stats.weld_groups, 2);
        assert_eq!(collection.len(), 3);

        let [a_start, a_end] = endpoints(&collection.features[0]);
        let [b_start, b_end] = endpoints(&collection.features[1]);
        let [c_start, c_end] = endpoints(&collection.features[2]);
        assert_eq!(a_start, Position::new(0.28, 0.19));
        assert_eq!(c_end, Position::new(17.1, 0.04));
        assert_eq!(a_end, b_start);
        assert_eq!(b_end, c_start);
        assert_relative_eq!(a_end.x, 4.4, epsilon = 1e-9);
        assert_relative_eq!(a_end.y, 0.045, epsilon = 1e-9);
        assert_relative_eq!(b_end.x, 11.44, epsilon = 1e-9);
        assert_relative_eq!(b_end.y, -0.03, epsilon = 1e-9);

        let once = collection.clone();
        consolidate_network(&mut collection, &config);
        assert_eq!(collection, once);
    }

    #[test]
    fn test_short_link_is_welded_at_both_ends() {
        let mut collection = lines(vec![
            wall(0.0, 0.0, 5.0, 0.0),
            wall(5.5, 0.1, 6.5, 0.1),
            wall(7.0, 0.0, 12.0, 0.0),
        ]);
        let mut catalog = SegmentCatalog::build(&mut collection, 0.0);
        let groups = weld_endpoints(&mut catalog, &ConsolidationConfig::default());

        let members: Vec<Vec<WeldMember>> =
            groups.iter().map(|g| g.members.to_vec()).collect();
        assert_eq!(
            members,
            vec![
                vec![
                    WeldMember { segment: SegmentId(0), endpoint: 1 },
                    WeldMember { segment: SegmentId(1), endpoint: 0 },
                ],
                vec![
                    WeldMember { segment: SegmentId(1), endpoint: 1 },
                    WeldMember { segment: SegmentId(2), endpoint: 0 },
                ],
            ]
        );
        assert_eq!(catalog.get(SegmentId(0)).start, Position::new(0.0, 0.0));
        assert_eq!(catalog.get(SegmentId(2)).end, Position::new(12.0, 0.0));
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let mut collection = lines(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            wall(10.4, 0.2, 20.0, 0.2),
            wall(20.5, -0.1, 30.0, 0.0),
            wall(0.0, 50.0, 10.0, 50.0),
            wall(2.0, 50.3, 8.0, 50.3),
        ]);
        let config = ConsolidationConfig::default();

        consolidate_network(&mut collection, &config);
        let once = collection.clone();
        consolidate_network(&mut collection, &config);

        assert_eq!(collection, once);
    }

    #[test]
    fn test_non_line_features_pass_through() {
        let marker = Feature::new(Geometry::Point(Position::new(10.1, 0.1)));
        let mut collection = lines(vec![
            wall(0.0, 0.0, 10.0, 0.0),
            marker.clone(),
            wall(10.4, 0.2, 20.0, 0.2),
        ]);
        consolidate_network(&mut collection, &ConsolidationConfig::default());

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.features[1], marker);
    }
}
