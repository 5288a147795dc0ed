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
    collections::BTreeSet,
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};

use opentelemetry::{KeyValue, metrics::Counter};
use tracing::{debug, instrument};

use crate::{Error, ErrorCode, METER, Result, name::PartitionGroup};

use super::{
    PartitionAssignment,
    cache::{AssignmentCache, GroupAssignments, Snapshot},
    members::{Member, MemberRegistry},
    strategy::{AssignmentStrategy, MemberPartitions},
};

static ASSIGNMENT_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quay_assignment_requests")
        .with_description("The number of partition assignment requests")
        .build()
});

static ASSIGNMENT_CACHE: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quay_assignment_cache")
        .with_description("The number of partition assignment cache lookups")
        .build()
});

/// Partition Assignment Coordinator
#[derive(Clone, Debug)]
pub struct PartitionAssignmentHandler {
    strategy: Arc<dyn AssignmentStrategy>,
    members: Arc<MemberRegistry>,
    cache: Arc<AssignmentCache>,
    ttl: Duration,
}

impl PartitionAssignmentHandler {
    pub fn new(strategy: Arc<dyn AssignmentStrategy>, ttl: Duration) -> Self {
        Self {
            strategy,
            members: Arc::new(MemberRegistry::default()),
            cache: Arc::new(AssignmentCache::default()),
            ttl,
        }
    }

    /// The partitions of `topic` assigned to `connection_id`, a member of `app`.
    #[instrument(skip(self, candidates))]
    pub async fn assign(
        &self,
        topic: &str,
        app: &str,
        connection_id: &str,
        connection_host: &str,
        session_timeout: Duration,
        candidates: &[PartitionGroup],
    ) -> Result<PartitionAssignment> {
        ASSIGNMENT_REQUESTS.add(1, &[KeyValue::new("strategy", self.strategy.name())]);

        if candidates.is_empty() {
            return Err(Error::Api(ErrorCode::NoPartitions));
        }

        let now = SystemTime::now();

        let partitions = candidates
            .iter()
            .flat_map(|group| group.partitions.iter().copied())
            .collect::<BTreeSet<_>>();

        let eligible = self.members.heartbeat(
            topic,
            app,
            Member {
                connection_id: connection_id.to_owned(),
                host: connection_host.to_owned(),
                session_timeout,
                last_seen: now,
                eligible: partitions,
            },
        )?;

        let holder = self.cache.entry(topic, app)?;
        let _computing = holder.lock().await;

        let snapshot = holder.snapshot()?;

        if self.is_fresh(&snapshot, &eligible, now) {
            ASSIGNMENT_CACHE.add(1, &[KeyValue::new("outcome", "hit")]);
            debug!(topic, app, version = snapshot.assignments().version, hit = true);

            return Ok(assignment_for(
                topic,
                app,
                connection_id,
                snapshot.assignments(),
                snapshot.created_at(),
            ));
        }

        ASSIGNMENT_CACHE.add(1, &[KeyValue::new("outcome", "miss")]);

        let members = self
            .strategy
            .assign(&eligible, &snapshot.assignments().members)?;

        let assignments = GroupAssignments {
            eligible,
            members,
            version: snapshot.assignments().version + 1,
        };

        debug!(topic, app, ?assignments);

        let assigned = assignment_for(topic, app, connection_id, &assignments, now);
        holder.replace(assignments, now)?;

        Ok(assigned)
    }

    /// The cached assignment was computed for the current eligibility of
    /// every live member and is still within its TTL.
    fn is_fresh(&self, snapshot: &Snapshot, eligible: &MemberPartitions, now: SystemTime) -> bool {
        snapshot.assignments().version > 0
            && !snapshot.is_expired_at(self.ttl, now)
            && &snapshot.assignments().eligible == eligible
    }
}

fn assignment_for(
    topic: &str,
    app: &str,
    connection_id: &str,
    assignments: &GroupAssignments,
    created_at: SystemTime,
) -> PartitionAssignment {
    PartitionAssignment {
        topic: topic.to_owned(),
        app: app.to_owned(),
        partitions: assignments
            .members
            .get(connection_id)
            .cloned()
            .unwrap_or_default(),
        version: assignments.version,
        created_at,
    }
}
