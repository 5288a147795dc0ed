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

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use tokio::sync::MutexGuard;

use crate::Result;

use super::strategy::MemberPartitions;

/// An assignment of every eligible partition of a topic to the members of an
/// app, with the eligibility it was computed from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupAssignments {
    pub eligible: MemberPartitions,
    pub members: MemberPartitions,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    assignments: Arc<GroupAssignments>,
    created_at: SystemTime,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            assignments: Arc::new(GroupAssignments::default()),
            created_at: SystemTime::UNIX_EPOCH,
        }
    }
}

impl Snapshot {
    pub fn assignments(&self) -> &GroupAssignments {
        &self.assignments
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn is_expired_at(&self, ttl: Duration, now: SystemTime) -> bool {
        now.duration_since(self.created_at)
            .is_ok_and(|age| age > ttl)
    }
}

/// A cache entry whose assignment and creation time are always replaced
/// together.
#[derive(Debug, Default)]
pub struct AssignmentsHolder {
    snapshot: RwLock<Arc<Snapshot>>,
    computing: tokio::sync::Mutex<()>,
}

impl AssignmentsHolder {
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.clone())
            .map_err(Into::into)
    }

    pub fn replace(&self, assignments: GroupAssignments, created_at: SystemTime) -> Result<()> {
        self.snapshot
            .write()
            .map(|mut snapshot| {
                *snapshot = Arc::new(Snapshot {
                    assignments: Arc::new(assignments),
                    created_at,
                })
            })
            .map_err(Into::into)
    }

    /// Serializes recomputation of this entry.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.computing.lock().await
    }
}

/// Assignments by (topic, app).
#[derive(Debug, Default)]
pub struct AssignmentCache {
    entries: Mutex<BTreeMap<(String, String), Arc<AssignmentsHolder>>>,
}

impl AssignmentCache {
    /// The entry for (topic, app), created already expired when absent.
    pub fn entry(&self, topic: &str, app: &str) -> Result<Arc<AssignmentsHolder>> {
        self.entries
            .lock()
            .map(|mut entries| {
                entries
                    .entry((topic.to_owned(), app.to_owned()))
                    .or_default()
                    .clone()
            })
            .map_err(Into::into)
    }
}
