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

//! Transaction Coordinator
//!
//! Epoch fenced two phase commit across partition leaders. The
//! [`handler::TransactionHandler`] owns the state machine, the
//! [`synchronizer::TransactionSynchronizer`] is the network half of the
//! protocol.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub mod handler;
pub mod manager;
pub mod metadata;
pub mod synchronizer;

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum TxnState {
    #[default]
    Empty,
    Ongoing,
    PrepareCommit,
    CompleteCommit,
    PrepareAbort,
    CompleteAbort,
}

impl TxnState {
    pub fn is_prepared(&self) -> bool {
        matches!(self, Self::PrepareCommit | Self::PrepareAbort)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::CompleteCommit | Self::CompleteAbort)
    }

    /// Whether the state machine permits moving from this state to `next`.
    ///
    /// Returning to [`TxnState::Empty`] is only done by clearing the
    /// metadata, never by a transition.
    pub fn may_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Empty | Self::Ongoing, Self::Ongoing)
            | (Self::Empty | Self::Ongoing, Self::PrepareCommit)
            | (Self::Empty | Self::Ongoing, Self::PrepareAbort)
            | (Self::PrepareCommit, Self::CompleteCommit)
            | (Self::PrepareAbort, Self::CompleteAbort) => true,
            _otherwise => false,
        }
    }
}

impl FromStr for TxnState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(Self::Empty),
            "ONGOING" => Ok(Self::Ongoing),
            "PREPARE_COMMIT" => Ok(Self::PrepareCommit),
            "COMPLETE_COMMIT" => Ok(Self::CompleteCommit),
            "PREPARE_ABORT" => Ok(Self::PrepareAbort),
            "COMPLETE_ABORT" => Ok(Self::CompleteAbort),
            otherwise => Err(Error::Message(format!("unknown txn state: {otherwise}"))),
        }
    }
}

impl Display for TxnState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "EMPTY",
            Self::Ongoing => "ONGOING",
            Self::PrepareCommit => "PREPARE_COMMIT",
            Self::CompleteCommit => "COMPLETE_COMMIT",
            Self::PrepareAbort => "PREPARE_ABORT",
            Self::CompleteAbort => "COMPLETE_ABORT",
        })
    }
}
