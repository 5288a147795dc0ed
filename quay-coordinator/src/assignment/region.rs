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

use tracing::debug;

use crate::{
    Result,
    name::{NameService, PartitionGroup},
};

/// Partition groups led from within `region`.
///
/// Leaderless groups are never nearby. A blank region, or a leader in an
/// unknown data center, is treated as nearby.
pub async fn nearby(
    groups: impl IntoIterator<Item = PartitionGroup>,
    region: Option<&str>,
    names: &dyn NameService,
) -> Result<Vec<PartitionGroup>> {
    let region = region.map(str::trim).filter(|region| !region.is_empty());

    let mut eligible = Vec::new();

    for group in groups {
        let Some(leader) = group.leader.as_ref() else {
            debug!(group = group.group, leaderless = true);
            continue;
        };

        let Some(region) = region else {
            eligible.push(group);
            continue;
        };

        match names.data_center(&leader.host).await? {
            Some(data_center) if data_center.region != region => {
                debug!(group = group.group, region, leader_region = data_center.region);
            }

            _nearby_or_unknown => eligible.push(group),
        }
    }

    Ok(eligible)
}
