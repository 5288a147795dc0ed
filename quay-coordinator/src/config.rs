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

use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::{TracingFormat, assignment::Strategy};

/// Coordinator configuration
///
/// May be flattened into the arguments of an enclosing broker.
#[derive(Clone, Debug, Eq, Parser, PartialEq)]
pub struct Config {
    /// The broker hosting these coordinators
    #[arg(long, env = "QUAY_NODE_ID", default_value_t = 111)]
    pub node_id: i32,

    /// Upper bound of each call to a partition leader, in milliseconds
    #[arg(long, env = "QUAY_SYNCHRONIZER_TIMEOUT_MS", default_value_t = 5_000)]
    pub synchronizer_timeout_ms: u64,

    /// Lifetime of a cached partition assignment, in milliseconds
    #[arg(long, env = "QUAY_ASSIGNMENT_TTL_MS", default_value_t = 60_000)]
    pub assignment_ttl_ms: u64,

    /// Producer ids claimed from the id sequence at a time
    #[arg(long, env = "QUAY_PRODUCER_ID_BLOCK_SIZE", default_value_t = 1_000)]
    pub producer_id_block_size: i64,

    /// Largest transaction timeout a producer may declare, in milliseconds
    #[arg(long, env = "QUAY_MAX_TRANSACTION_TIMEOUT_MS", default_value_t = 900_000)]
    pub max_transaction_timeout_ms: u64,

    /// Partition assignment strategy: sticky or round-robin
    #[arg(long, env = "QUAY_ASSIGNMENT_STRATEGY", default_value = "sticky")]
    pub assignment_strategy: Strategy,

    /// Log format: text or json
    #[arg(long, env = "QUAY_TRACING_FORMAT", default_value = "text")]
    pub tracing_format: TracingFormat,

    /// OTEL Exporter OTLP endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint_url: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: 111,
            synchronizer_timeout_ms: 5_000,
            assignment_ttl_ms: 60_000,
            producer_id_block_size: 1_000,
            max_transaction_timeout_ms: 900_000,
            assignment_strategy: Strategy::default(),
            tracing_format: TracingFormat::default(),
            otlp_endpoint_url: None,
        }
    }
}

impl Config {
    pub fn synchronizer_timeout(&self) -> Duration {
        Duration::from_millis(self.synchronizer_timeout_ms)
    }

    pub fn assignment_ttl(&self) -> Duration {
        Duration::from_millis(self.assignment_ttl_ms)
    }

    pub fn max_transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.max_transaction_timeout_ms)
    }
}
