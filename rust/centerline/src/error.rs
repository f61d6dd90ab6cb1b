// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for feature loading and configuration
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the edges of the pipeline.
///
/// The geometric passes themselves never fail: degenerate input is skipped.
/// Everything here comes from reading collections or configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Position needs at least 2 ordinates, got {0}")]
    InvalidPosition(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
