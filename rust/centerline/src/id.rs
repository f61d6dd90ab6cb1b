// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Opaque feature identifiers

use uuid::Uuid;

/// Generate a random identifier: a v4 UUID as 32 lowercase hex digits, no dashes.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
