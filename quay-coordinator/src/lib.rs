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
//
//! Quay Coordinator
//!
//! The broker side coordinators of the quay message queue:
//!
//! - a transaction coordinator ([`txn::handler::TransactionHandler`]) giving
//!   producers atomic multi-partition writes through epoch fenced two phase
//!   commit, driving a [`txn::synchronizer::TransactionSynchronizer`] against
//!   partition leaders;
//! - a partition assignment coordinator
//!   ([`assignment::handler::PartitionAssignmentHandler`]) handing out
//!   partitions to consumer group members, with data center affinity and a
//!   TTL cache of previous assignments.
//!
//! Ownership of a transaction or group id is decided elsewhere and consulted
//! through [`oracle::Ownership`]. Topic and broker facts come from a
//! [`name::NameService`].
//!
//! ```
//! # use quay_coordinator::{Config, Coordinator, Error};
//! # use quay_coordinator::{name::memory::InMemory, oracle::Everything};
//! # use quay_coordinator::txn::synchronizer::Noop;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let coordinator = Coordinator::builder()
//!     .config(Config::default())
//!     .ownership(Everything)
//!     .name_service(InMemory::default())
//!     .synchronizer(Noop)
//!     .build()?;
//!
//! coordinator.start()?;
//! # Ok(())
//! # }
//! ```

use std::{
    fmt, io,
    result,
    str::FromStr,
    sync::{Arc, LazyLock, PoisonError},
};

use opentelemetry::{InstrumentationScope, global, metrics::Meter};
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_semantic_conventions::SCHEMA_URL;
use thiserror::Error;
use tokio::time::error::Elapsed;
use tracing_subscriber::{filter::ParseError, util::TryInitError};

pub mod assignment;
pub mod code;
pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod name;
pub mod oracle;
pub mod otel;
pub mod producer;
pub mod service;
pub mod txn;

pub use code::ErrorCode;
pub use config::Config;
pub use coordinator::Coordinator;

pub(crate) static METER: LazyLock<Meter> = LazyLock::new(|| {
    global::meter_with_scope(
        InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
});

#[derive(Error, Debug)]
pub enum Error {
    Api(ErrorCode),
    Elapsed(#[from] Elapsed),
    ExporterBuild(#[from] ExporterBuildError),
    Io(Arc<io::Error>),
    Json(#[from] serde_json::Error),
    Message(String),
    ParseFilter(#[from] ParseError),
    Poison,
    Synchronizer(String),
    TryInit(#[from] TryInitError),
    UnsupportedAssignmentStrategy(String),
    UnsupportedTracingFormat(String),
    Url(#[from] url::ParseError),
}

impl Error {
    /// The error code reported to a client for this error.
    ///
    /// Protocol outcomes keep their own code, anything else is an
    /// unexpected server error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Api(code) => *code,
            _otherwise => ErrorCode::UnknownServerError,
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(value: ErrorCode) -> Self {
        Self::Api(value)
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "{msg}"),
            Self::Api(code) => write!(f, "{code}"),
            error => write!(f, "{error:?}"),
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TracingFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for TracingFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            otherwise => Err(Error::UnsupportedTracingFormat(otherwise.to_owned())),
        }
    }
}

impl fmt::Display for TracingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}
