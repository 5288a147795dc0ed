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
    fmt::Debug,
};

use tracing::debug;

use crate::{Error, ErrorCode, Result};

/// Partitions by member id.
pub type MemberPartitions = BTreeMap<String, BTreeSet<i32>>;

/// Distributes partitions over live members.
///
/// `eligible` holds the partitions each live member may be given. Every
/// partition eligible for some member is given to exactly one member that is
/// eligible for it. Every member appears in the result even when it is given
/// nothing.
pub trait AssignmentStrategy: Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn assign(
        &self,
        eligible: &MemberPartitions,
        previous: &MemberPartitions,
    ) -> Result<MemberPartitions>;
}

fn empty(eligible: &MemberPartitions) -> Result<MemberPartitions> {
    if eligible.is_empty() {
        Err(Error::Api(ErrorCode::AssignorError))
    } else {
        Ok(eligible
            .keys()
            .map(|member| (member.clone(), BTreeSet::new()))
            .collect())
    }
}

fn partitions(eligible: &MemberPartitions) -> BTreeSet<i32> {
    eligible.values().flatten().copied().collect()
}

/// Keeps previous ownership up to a fair share, the surplus and any orphans
/// go to the least loaded eligible member.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Sticky;

impl AssignmentStrategy for Sticky {
    fn name(&self) -> &'static str {
        "sticky"
    }

    fn assign(
        &self,
        eligible: &MemberPartitions,
        previous: &MemberPartitions,
    ) -> Result<MemberPartitions> {
        let mut assignment = empty(eligible)?;
        let partitions = partitions(eligible);

        // at most `remainder` members may hold one more than `floor`
        let floor = partitions.len() / eligible.len();
        let remainder = partitions.len() % eligible.len();
        let mut above_floor = 0;

        let mut assigned = BTreeSet::new();

        for (member, owned) in previous {
            let (Some(kept), Some(allowed)) = (assignment.get_mut(member), eligible.get(member))
            else {
                continue;
            };

            let quota = if above_floor < remainder {
                floor + 1
            } else {
                floor
            };

            for partition in owned {
                if kept.len() >= quota {
                    break;
                }

                if allowed.contains(partition) && assigned.insert(*partition) {
                    _ = kept.insert(*partition);
                }
            }

            if kept.len() > floor {
                above_floor += 1;
            }
        }

        let mut orphans = partitions.difference(&assigned).copied().collect::<Vec<_>>();

        // the most constrained partitions are placed first
        orphans.sort_by_key(|partition| {
            (
                eligible
                    .values()
                    .filter(|allowed| allowed.contains(partition))
                    .count(),
                *partition,
            )
        });

        debug!(kept = assigned.len(), orphans = orphans.len());

        for partition in orphans {
            let least = assignment
                .iter_mut()
                .filter(|(member, _)| {
                    eligible
                        .get(*member)
                        .is_some_and(|allowed| allowed.contains(&partition))
                })
                .min_by(|(a, a_owned), (b, b_owned)| {
                    a_owned.len().cmp(&b_owned.len()).then_with(|| a.cmp(b))
                })
                .map(|(_, owned)| owned)
                .ok_or(Error::Api(ErrorCode::AssignorError))?;

            _ = least.insert(partition);
        }

        Ok(assignment)
    }
}

/// Deals partitions in order to eligible members in turn, ignoring history.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RoundRobin;

impl AssignmentStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn assign(
        &self,
        eligible: &MemberPartitions,
        _previous: &MemberPartitions,
    ) -> Result<MemberPartitions> {
        let mut assignment = empty(eligible)?;
        let order = eligible.iter().collect::<Vec<_>>();
        let mut next = 0;

        for partition in partitions(eligible) {
            let chosen = (0..order.len())
                .map(|offset| (next + offset) % order.len())
                .find(|index| order[*index].1.contains(&partition));

            if let Some(index) = chosen {
                if let Some(owned) = assignment.get_mut(order[index].0) {
                    _ = owned.insert(partition);
                }

                next = (index + 1) % order.len();
            }
        }

        Ok(assignment)
    }
}
