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

//! Transaction Synchronizer
//!
//! The network half of two phase commit. Each call must be durably recorded
//! by every partition leader involved before returning `Ok`. A failure may
//! leave some leaders prepared and others not, leader side cleanup is the
//! synchronizer's concern.

use std::{
    collections::BTreeSet,
    fmt::Debug,
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram},
};
use tracing::{debug, error};

use crate::{METER, Result};

use super::metadata::{TransactionMetadata, TransactionOffset, TransactionPrepare};

#[async_trait]
pub trait TransactionSynchronizer: Debug + Send + Sync + 'static {
    /// Record the partitions enlisted in an ongoing transaction.
    async fn prepare(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()>;

    async fn prepare_commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()>;

    async fn commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
        offsets: &BTreeSet<TransactionOffset>,
    ) -> Result<()>;

    async fn prepare_abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()>;

    async fn abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()>;
}

#[async_trait]
impl<S> TransactionSynchronizer for Arc<S>
where
    S: TransactionSynchronizer + ?Sized,
{
    async fn prepare(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        (**self).prepare(metadata, prepares).await
    }

    async fn prepare_commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        (**self).prepare_commit(metadata, prepares).await
    }

    async fn commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
        offsets: &BTreeSet<TransactionOffset>,
    ) -> Result<()> {
        (**self).commit(metadata, prepares, offsets).await
    }

    async fn prepare_abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        (**self).prepare_abort(metadata, prepares).await
    }

    async fn abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        (**self).abort(metadata, prepares).await
    }
}

/// Accepts everything, for a single node without remote partition leaders.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Noop;

#[async_trait]
impl TransactionSynchronizer for Noop {
    async fn prepare(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        debug!(transaction_id = metadata.id(), prepares = prepares.len());
        Ok(())
    }

    async fn prepare_commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        debug!(transaction_id = metadata.id(), prepares = prepares.len());
        Ok(())
    }

    async fn commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
        offsets: &BTreeSet<TransactionOffset>,
    ) -> Result<()> {
        debug!(
            transaction_id = metadata.id(),
            prepares = prepares.len(),
            offsets = offsets.len()
        );
        Ok(())
    }

    async fn prepare_abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        debug!(transaction_id = metadata.id(), prepares = prepares.len());
        Ok(())
    }

    async fn abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        debug!(transaction_id = metadata.id(), prepares = prepares.len());
        Ok(())
    }
}

static SYNCHRONIZER_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quay_synchronizer_requests")
        .with_description("The number of synchronizer requests made")
        .build()
});

static SYNCHRONIZER_DURATION: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram("quay_synchronizer_duration")
        .with_unit("ms")
        .with_description("The synchronizer latencies in milliseconds")
        .build()
});

/// Bounds every call of an inner synchronizer by a timeout, independent of
/// the transaction timeout.
///
/// An elapsed call is reported as [`crate::Error::Elapsed`].
#[derive(Clone, Debug)]
pub struct Timeout<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Timeout<S>
where
    S: TransactionSynchronizer,
{
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<F>(&self, method: &'static str, transaction_id: &str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        let start = SystemTime::now();

        let outcome = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(Into::into)
            .and_then(|result| result);

        let attributes = [
            KeyValue::new("method", method),
            KeyValue::new("outcome", if outcome.is_ok() { "ok" } else { "error" }),
        ];

        SYNCHRONIZER_REQUESTS.add(1, &attributes);
        SYNCHRONIZER_DURATION.record(
            start
                .elapsed()
                .map_or(0, |duration| duration.as_millis() as u64),
            &attributes,
        );

        outcome.inspect_err(|err| error!(method, transaction_id, ?err))
    }
}

#[async_trait]
impl<S> TransactionSynchronizer for Timeout<S>
where
    S: TransactionSynchronizer,
{
    async fn prepare(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.bounded(
            "prepare",
            metadata.id(),
            self.inner.prepare(metadata, prepares),
        )
        .await
    }

    async fn prepare_commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.bounded(
            "prepare_commit",
            metadata.id(),
            self.inner.prepare_commit(metadata, prepares),
        )
        .await
    }

    async fn commit(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
        offsets: &BTreeSet<TransactionOffset>,
    ) -> Result<()> {
        self.bounded(
            "commit",
            metadata.id(),
            self.inner.commit(metadata, prepares, offsets),
        )
        .await
    }

    async fn prepare_abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.bounded(
            "prepare_abort",
            metadata.id(),
            self.inner.prepare_abort(metadata, prepares),
        )
        .await
    }

    async fn abort(
        &self,
        metadata: &TransactionMetadata,
        prepares: &BTreeSet<TransactionPrepare>,
    ) -> Result<()> {
        self.bounded("abort", metadata.id(), self.inner.abort(metadata, prepares))
            .await
    }
}
