// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounding-box range index backed by an R-tree
//!
//! Entries are axis-aligned boxes carrying a small payload (a segment handle
//! or a point-sample handle). Points are stored as zero-area boxes.
//!
//! Query results come back in R-tree traversal order, which depends on the
//! tree shape. Callers that break ties must sort the hits themselves.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::types::BoundingBox;

type IndexedBox<T> = GeomWithData<Rectangle<[f64; 2]>, T>;

/// R-tree over boxes with payload `T`
pub struct SpatialIndex<T> {
    tree: RTree<IndexedBox<T>>,
}

impl<T: Copy> SpatialIndex<T> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Build a balanced tree from all entries at once
    pub fn bulk_load(entries: impl IntoIterator<Item = (BoundingBox, T)>) -> Self {
        let boxes: Vec<IndexedBox<T>> = entries
            .into_iter()
            .map(|(bbox, payload)| {
                GeomWithData::new(
                    Rectangle::from_corners(bbox.min_corner(), bbox.max_corner()),
                    payload,
                )
            })
            .collect();

        Self {
            tree: RTree::bulk_load(boxes),
        }
    }

    pub fn insert(&mut self, min: [f64; 2], max: [f64; 2], payload: T) {
        self.tree
            .insert(GeomWithData::new(Rectangle::from_corners(min, max), payload));
    }

    /// Payloads of every entry whose box touches `[min, max]`
    pub fn search(&self, min: [f64; 2], max: [f64; 2]) -> Vec<T> {
        let envelope = AABB::from_corners(min, max);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect()
    }

    pub fn search_box(&self, bbox: &BoundingBox) -> Vec<T> {
        self.search(bbox.min_corner(), bbox.max_corner())
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl<T: Copy> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
