// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline configuration loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consolidator::ConsolidationConfig;
use crate::error::{Error, Result};
use crate::matcher::CenterlineConfig;

/// Parameters for both pipeline stages.
///
/// Every section and field may be omitted from a file; missing values take
/// their defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall pairing.
    pub centerline: CenterlineConfig,
    /// Merge and weld pass over the centerlines.
    pub consolidation: ConsolidationConfig,
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject values the pipeline cannot do anything sensible with.
    ///
    /// The geometric passes take their parameters as given; callers that
    /// accept user input should check it here first.
    pub fn validate(&self) -> Result<()> {
        let c = &self.centerline;
        positive("centerline.search_extend", c.search_extend)?;
        positive("centerline.max_width", c.max_width)?;
        non_negative("centerline.min_width", c.min_width)?;
        non_negative("centerline.line_min_length", c.line_min_length)?;
        if c.min_width >= c.max_width {
            return Err(Error::InvalidConfig(format!(
                "centerline.min_width ({}) must be below centerline.max_width ({})",
                c.min_width, c.max_width
            )));
        }

        let m = &self.consolidation;
        non_negative("consolidation.search_radius", m.search_radius)?;
        positive("consolidation.distance", m.distance)?;
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be zero or more, got {value}"
        )))
    }
}
