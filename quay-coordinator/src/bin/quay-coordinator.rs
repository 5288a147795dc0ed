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

use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;
use quay_coordinator::{
    Config, Coordinator, Result,
    name::memory::{InMemory, Topology},
    oracle::Everything,
    otel,
    txn::synchronizer::Noop,
};
use tokio::{
    signal::unix::{SignalKind, signal},
    time,
};
use tracing::{debug, warn};

/// A standalone coordinator owning every id, serving a fixed topology.
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// JSON topology of topics, partition groups and broker data centers
    #[arg(long, env = "QUAY_TOPOLOGY")]
    topology: Option<PathBuf>,

    /// How often open transactions are checked against their timeout, in milliseconds
    #[arg(long, env = "QUAY_EXPIRY_CHECK_MS", default_value_t = 10_000)]
    expiry_check_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = otel::init(&cli.config)?;

    let names = cli
        .topology
        .as_ref()
        .inspect(|topology| debug!(?topology))
        .map(fs::read_to_string)
        .transpose()?
        .map(|json| json.parse::<Topology>().map(InMemory::from))
        .transpose()?
        .unwrap_or_default();

    let coordinator = Coordinator::builder()
        .config(cli.config)
        .ownership(Everything)
        .name_service(names)
        .synchronizer(Noop)
        .build()?;

    coordinator.start()?;

    let mut interrupt_signal = signal(SignalKind::interrupt())?;
    let mut terminate_signal = signal(SignalKind::terminate())?;

    let mut interval = time::interval(Duration::from_millis(cli.expiry_check_ms));

    loop {
        tokio::select! {
            interrupt = interrupt_signal.recv() => {
                debug!(?interrupt);
                break;
            }

            terminate = terminate_signal.recv() => {
                debug!(?terminate);
                break;
            }

            _ = interval.tick() => {
                for metadata in coordinator.txn().handler().expired_transactions().await? {
                    warn!(
                        transaction_id = metadata.id(),
                        producer_id = metadata.producer_id(),
                        state = ?metadata.state(),
                        expired = true
                    );
                }
            }
        }
    }

    coordinator.stop()
}
