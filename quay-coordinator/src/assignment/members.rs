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
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
    time::{Duration, SystemTime},
};

use tracing::debug;

use crate::Result;

use super::strategy::MemberPartitions;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Member {
    pub connection_id: String,
    pub host: String,
    pub session_timeout: Duration,
    pub last_seen: SystemTime,

    /// Partitions this member may be given, from its own candidate groups.
    pub eligible: BTreeSet<i32>,
}

impl Member {
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.last_seen
            .checked_add(self.session_timeout)
            .is_some_and(|deadline| deadline < now)
    }
}

type Key = (String, String);

/// Live members by (topic, app), refreshed on every fetch.
#[derive(Debug, Default)]
pub struct MemberRegistry {
    groups: Mutex<BTreeMap<Key, BTreeMap<String, Member>>>,
}

impl MemberRegistry {
    /// Register or refresh `member`, evicting any member whose session has
    /// lapsed, returning the eligible partitions of every live member.
    pub fn heartbeat(&self, topic: &str, app: &str, member: Member) -> Result<MemberPartitions> {
        let now = member.last_seen;

        let mut groups = self.groups.lock()?;
        let members = groups
            .entry((topic.to_owned(), app.to_owned()))
            .or_default();

        _ = members.insert(member.connection_id.clone(), member);

        members.retain(|connection_id, member| {
            let live = !member.is_expired_at(now);

            if !live {
                debug!(topic, app, connection_id, evicted = true);
            }

            live
        });

        Ok(members
            .iter()
            .map(|(connection_id, member)| (connection_id.clone(), member.eligible.clone()))
            .collect())
    }
}
