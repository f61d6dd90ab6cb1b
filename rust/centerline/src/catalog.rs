// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment catalog: the eligible line segments of a feature collection
//!
//! The catalog is an arena. Segments live in a `Vec` in feature scan order
//! and are addressed by [`SegmentId`] handles, so every pass that walks the
//! catalog visits segments in the same order on every run.
//!
//! Building a catalog:
//! 1. drops lines shorter than the minimum length,
//! 2. resolves an id for each remaining line (feature id, `"id"` property,
//!    or a fresh one) and writes it back to the feature,
//! 3. removes later features whose endpoints repeat an earlier one,
//! 4. skips lines without a direction (coincident endpoints).

use nalgebra::{Point2, Vector2};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::id::generate_id;
use crate::predicates::{self, Line};
use crate::spatial_index::SpatialIndex;
use crate::types::{BoundingBox, FeatureCollection, Position};

/// Endpoints closer than this are the same point for duplicate detection
pub const DUPLICATE_TOLERANCE: f64 = 1e-6;

/// Handle of a segment: its position in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub usize);

impl SegmentId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One eligible two-point line
#[derive(Debug, Clone)]
pub struct Segment {
    /// Opaque identifier, also stored on the source feature
    pub id: String,
    /// Index of the source feature in the collection
    pub feature: usize,
    pub start: Position,
    pub end: Position,
    /// Unit direction start → end at catalog time
    pub normal: Vector2<f64>,
    pub length: f64,
    pub bbox: BoundingBox,
    /// Segments a midline has already been built with
    pub paired_with: FxHashSet<SegmentId>,
}

impl Segment {
    pub fn line(&self) -> Line {
        [self.start.to_nalgebra(), self.end.to_nalgebra()]
    }

    pub fn positions(&self) -> [Position; 2] {
        [self.start, self.end]
    }

    /// Move one endpoint in the plane, keeping its Z, and refresh the bbox
    pub fn move_endpoint(&mut self, index: usize, location: &Point2<f64>) {
        let endpoint = if index == 0 {
            &mut self.start
        } else {
            &mut self.end
        };
        endpoint.x = location.x;
        endpoint.y = location.y;
        self.bbox = BoundingBox::from_points(&self.start.to_nalgebra(), &self.end.to_nalgebra());
    }

    pub fn is_paired_with(&self, other: SegmentId) -> bool {
        self.paired_with.contains(&other)
    }
}

/// Counts of lines dropped while building a catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub line_features: usize,
    pub removed_short: usize,
    pub removed_duplicate: usize,
    pub removed_degenerate: usize,
    pub segments: usize,
}

/// Ordered arena of segments
#[derive(Debug, Clone, Default)]
pub struct SegmentCatalog {
    segments: Vec<Segment>,
    stats: CatalogStats,
}

struct Candidate {
    feature: usize,
    start: Position,
    end: Position,
    length: f64,
}

impl SegmentCatalog {
    /// Build the catalog from the line features of `collection`
    ///
    /// Duplicate features are removed from `collection`; segment feature
    /// indices refer to the collection as it is after this call.
    pub fn build(collection: &mut FeatureCollection, min_length: f64) -> Self {
        let mut stats = CatalogStats::default();
        let mut candidates = Vec::new();

        for (i, feature) in collection.features.iter_mut().enumerate() {
            let Some(coords) = feature.line_coordinates() else {
                continue;
            };
            if coords.len() < 2 {
                continue;
            }
            stats.line_features += 1;

            let (start, end) = (coords[0], coords[1]);
            let length = predicates::length(&start.to_nalgebra(), &end.to_nalgebra());
            if length < min_length {
                stats.removed_short += 1;
                continue;
            }

            if feature.id.is_none() {
                feature.id = Some(feature.property_id().unwrap_or_else(generate_id));
            }

            candidates.push(Candidate {
                feature: i,
                start,
                end,
                length,
            });
        }

        let duplicate = find_duplicates(&candidates);
        stats.removed_duplicate = duplicate.iter().filter(|d| **d).count();

        let remap = remove_features(
            collection,
            candidates
                .iter()
                .zip(&duplicate)
                .filter(|(_, dup)| **dup)
                .map(|(c, _)| c.feature),
        );

        let mut segments = Vec::with_capacity(candidates.len());
        for (candidate, _) in candidates
            .into_iter()
            .zip(duplicate)
            .filter(|(_, dup)| !*dup)
        {
            let a = candidate.start.to_nalgebra();
            let b = candidate.end.to_nalgebra();
            let Some(normal) = predicates::normal(&a, &b) else {
                stats.removed_degenerate += 1;
                continue;
            };

            let feature = remap[candidate.feature];
            let id = collection.features[feature].id.clone().unwrap_or_else(generate_id);

            segments.push(Segment {
                id,
                feature,
                start: candidate.start,
                end: candidate.end,
                normal,
                length: candidate.length,
                bbox: BoundingBox::from_points(&a, &b),
                paired_with: FxHashSet::default(),
            });
        }
        stats.segments = segments.len();

        debug!(
            lines = stats.line_features,
            short = stats.removed_short,
            duplicate = stats.removed_duplicate,
            degenerate = stats.removed_degenerate,
            segments = stats.segments,
            "built segment catalog"
        );

        Self { segments, stats }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn stats(&self) -> &CatalogStats {
        &self.stats
    }

    pub fn get(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0]
    }

    pub fn get_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .map(|(i, s)| (SegmentId(i), s))
    }

    /// Record a pairing on both segments
    pub fn mark_paired(&mut self, a: SegmentId, b: SegmentId) {
        self.segments[a.0].paired_with.insert(b);
        self.segments[b.0].paired_with.insert(a);
    }

    /// Index of every segment's bounding box
    pub fn segment_index(&self) -> SpatialIndex<SegmentId> {
        SpatialIndex::bulk_load(self.iter().map(|(id, s)| (s.bbox, id)))
    }

    /// Copy segment endpoints back into their source features
    ///
    /// Only the first two coordinates of a line are replaced. Feature
    /// bounding boxes are recomputed.
    pub fn write_back(&self, collection: &mut FeatureCollection) {
        for segment in &self.segments {
            let Some(feature) = collection.features.get_mut(segment.feature) else {
                continue;
            };
            if let Some(coords) = feature.geometry.as_line_mut() {
                if coords.len() >= 2 {
                    coords[0] = segment.start;
                    coords[1] = segment.end;
                }
            }
            feature.refresh_bbox();
        }
    }
}

fn is_like(a: &Candidate, b: &Candidate) -> bool {
    let same = |p: &Position, q: &Position| p.distance_to(q) <= DUPLICATE_TOLERANCE;
    (same(&a.start, &b.start) && same(&a.end, &b.end))
        || (same(&a.start, &b.end) && same(&a.end, &b.start))
}

/// First-seen-wins duplicate marking
///
/// A candidate already marked as a duplicate does not mark others, so the
/// result is not transitively closed: with A≈B and B≈C but A≉C, A and C
/// both survive.
fn find_duplicates(candidates: &[Candidate]) -> Vec<bool> {
    let index = SpatialIndex::bulk_load(candidates.iter().enumerate().map(|(i, c)| {
        (
            BoundingBox::from_points(&c.start.to_nalgebra(), &c.end.to_nalgebra()),
            i,
        )
    }));

    let mut duplicate = vec![false; candidates.len()];
    for (i, candidate) in candidates.iter().enumerate() {
        if duplicate[i] {
            continue;
        }
        let area = BoundingBox::from_points(
            &candidate.start.to_nalgebra(),
            &candidate.end.to_nalgebra(),
        )
        .expanded(DUPLICATE_TOLERANCE);

        let mut hits = index.search_box(&area);
        hits.sort_unstable();
        for j in hits {
            if j > i && !duplicate[j] && is_like(candidate, &candidates[j]) {
                duplicate[j] = true;
            }
        }
    }
    duplicate
}

/// Remove the given features, returning old index → new index
fn remove_features(
    collection: &mut FeatureCollection,
    removed: impl Iterator<Item = usize>,
) -> Vec<usize> {
    let mut keep = vec![true; collection.features.len()];
    for i in removed {
        keep[i] = false;
    }

    let mut remap = Vec::with_capacity(keep.len());
    let mut next = 0;
    for &k in &keep {
        remap.push(next);
        if k {
            next += 1;
        }
    }

    let mut flags = keep.into_iter();
    collection
        .features
        .retain(|_| flags.next().unwrap_or(true));
    remap
}
