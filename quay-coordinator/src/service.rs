// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request handlers
//!
//! Validate the session of a request, delegate to a coordinator and map the
//! outcome onto [`ErrorCode`]. Every response carries a code, no error
//! escapes a handler.

use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{Error, ErrorCode};

pub mod fetch_assigned_partition;
pub mod txn;

/// An established client session.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Connection {
    pub id: String,
    pub host: String,
    pub address: String,
    pub region: Option<String>,
    pub apps: BTreeSet<String>,
}

impl Connection {
    pub fn new(id: impl Into<String>, host: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn region(self, region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..self
        }
    }

    pub fn authorize(mut self, app: impl Into<String>) -> Self {
        _ = self.apps.insert(app.into());
        self
    }

    pub fn is_authorized(&self, app: &str) -> bool {
        self.apps.contains(app)
    }
}

/// The code reported for `err`, unexpected errors are logged.
pub(crate) fn error_code(method: &str, err: &Error) -> ErrorCode {
    let code = err.code();

    if code == ErrorCode::UnknownServerError {
        error!(method, ?err);
    }

    code
}

pub(crate) fn millis(ms: i32) -> Duration {
    u64::try_from(ms).map_or(Duration::ZERO, Duration::from_millis)
}
