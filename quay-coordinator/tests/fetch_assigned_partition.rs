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

use std::collections::BTreeSet;

use common::{Recording, connection, coordinator, init_tracing, topology};
use pretty_assertions::assert_eq;
use quay_coordinator::{
    Config, Coordinator, ErrorCode, Result,
    assignment::Strategy,
    oracle::{Everything, KeySet},
    service::{
        Connection,
        fetch_assigned_partition::{
            FetchAssignedPartitionData, FetchAssignedPartitionRequest,
            FetchAssignedPartitionResponse,
        },
    },
};

pub mod common;

const APP: &str = "consumer-grp";

async fn fetch(
    coordinator: &Coordinator,
    connection: &Connection,
    topics: &[(&str, bool)],
) -> FetchAssignedPartitionResponse {
    coordinator
        .fetch_assigned_partition()
        .serve(
            Some(connection),
            FetchAssignedPartitionRequest {
                app: APP.into(),
                topics: topics
                    .iter()
                    .map(|(topic, nearby)| FetchAssignedPartitionData {
                        topic: String::from(*topic),
                        nearby: *nearby,
                        session_timeout_ms: 30_000,
                    })
                    .collect(),
            },
        )
        .await
}

fn partitions(response: &FetchAssignedPartitionResponse, topic: &str) -> Vec<i32> {
    response
        .topics
        .get(topic)
        .map(|ack| ack.partitions.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn all_groups_of_a_topic() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = coordinator(Everything, topology()?, Recording::default())?;
    let response = fetch(&coordinator, &connection(APP), &[("orders", false)]).await;

    assert_eq!(ErrorCode::None, response.error_code);
    assert_eq!(ErrorCode::None, response.topics["orders"].error_code);
    assert_eq!(vec![0, 1, 2, 3, 4, 5], partitions(&response, "orders"));

    Ok(())
}

#[tokio::test]
async fn nearby_groups_fail_open() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = coordinator(Everything, topology()?, Recording::default())?;

    let east = connection(APP).region("east");
    let response = fetch(&coordinator, &east, &[("orders", true), ("payments", true)]).await;

    // group 2 is led from a host without a known data center
    assert_eq!(vec![0, 1, 4, 5], partitions(&response, "orders"));
    assert_eq!(vec![0], partitions(&response, "payments"));

    let blank = connection(APP).region("  ");
    let response = fetch(&coordinator, &blank, &[("orders", true)]).await;
    assert_eq!(ErrorCode::None, response.topics["orders"].error_code);

    Ok(())
}

#[tokio::test]
async fn regions_share_a_topic() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = coordinator(Everything, topology()?, Recording::default())?;

    let east = connection(APP).region("east");
    let west = connection(APP).region("west");

    let mut views = Vec::new();

    for round in 0..4 {
        let mine = partitions(&fetch(&coordinator, &east, &[("orders", true)]).await, "orders")
            .into_iter()
            .collect::<BTreeSet<_>>();

        let theirs = partitions(&fetch(&coordinator, &west, &[("orders", true)]).await, "orders")
            .into_iter()
            .collect::<BTreeSet<_>>();

        // east holds its first, unshared, view until it refetches
        if round > 0 {
            assert!(mine.is_disjoint(&theirs));
        }

        assert!(mine.is_subset(&BTreeSet::from([0, 1, 4, 5])));
        assert!(theirs.is_subset(&BTreeSet::from([2, 3, 4, 5])));
        assert_eq!(
            BTreeSet::from([0, 1, 2, 3, 4, 5]),
            mine.union(&theirs).copied().collect()
        );

        views.push((mine, theirs));
    }

    assert_eq!(
        Some(&(BTreeSet::from([0, 1, 4]), BTreeSet::from([2, 3, 5]))),
        views.last()
    );

    Ok(())
}

#[tokio::test]
async fn unknown_topic() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = coordinator(Everything, topology()?, Recording::default())?;
    let response = fetch(&coordinator, &connection(APP), &[("audit", false)]).await;

    assert_eq!(ErrorCode::None, response.error_code);
    assert_eq!(ErrorCode::TopicNotExist, response.topics["audit"].error_code);
    assert!(response.topics["audit"].partitions.is_empty());

    Ok(())
}

#[tokio::test]
async fn members_share_a_topic() -> Result<()> {
    let _guard = init_tracing()?;

    let coordinator = Coordinator::builder()
        .config(Config {
            assignment_strategy: Strategy::RoundRobin,
            ..Config::default()
        })
        .ownership(Everything)
        .name_service(topology()?)
        .synchronizer(Recording::default())
        .build()?;
    coordinator.start()?;

    let a = connection(APP);
    let b = connection(APP);

    let alone = fetch(&coordinator, &a, &[("orders", false)]).await;
    assert_eq!(vec![0, 1, 2, 3, 4, 5], partitions(&alone, "orders"));

    let joined = fetch(&coordinator, &b, &[("orders", false)]).await;
    let refetched = fetch(&coordinator, &a, &[("orders", false)]).await;

    let mine = partitions(&refetched, "orders")
        .into_iter()
        .collect::<BTreeSet<_>>();
    let theirs = partitions(&joined, "orders")
        .into_iter()
        .collect::<BTreeSet<_>>();

    assert_eq!(3, mine.len());
    assert_eq!(3, theirs.len());
    assert!(mine.is_disjoint(&theirs));
    assert_eq!(
        BTreeSet::from([0, 1, 2, 3, 4, 5]),
        mine.union(&theirs).copied().collect()
    );

    Ok(())
}

#[tokio::test]
async fn coordinator_not_current() -> Result<()> {
    let _guard = init_tracing()?;

    let ownership = KeySet::default();
    let coordinator = coordinator(ownership.clone(), topology()?, Recording::default())?;

    let response = fetch(&coordinator, &connection(APP), &[("orders", false)]).await;
    assert_eq!(
        FetchAssignedPartitionResponse::from(ErrorCode::CoordinatorNotCurrent),
        response
    );

    ownership.acquire_group(APP)?;

    let response = fetch(&coordinator, &connection(APP), &[("orders", false)]).await;
    assert_eq!(ErrorCode::None, response.error_code);

    ownership.relinquish_group(APP)?;

    let response = fetch(&coordinator, &connection(APP), &[("orders", false)]).await;
    assert_eq!(ErrorCode::CoordinatorNotCurrent, response.error_code);

    ownership.acquire_group(APP)?;
    coordinator.stop()?;

    let response = fetch(&coordinator, &connection(APP), &[("orders", false)]).await;
    assert_eq!(ErrorCode::CoordinatorNotCurrent, response.error_code);

    Ok(())
}
