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

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Error;

#[non_exhaustive]
#[derive(
    Clone, Copy, Default, Deserialize, Eq, Hash, Debug, Ord, PartialEq, PartialOrd, Serialize,
)]
/// Coordinator response error codes.
pub enum ErrorCode {
    UnknownServerError,
    #[default]
    None,
    UnknownTopicOrPartition,
    NotLeaderForPartition,
    CoordinatorNotAvailable,
    NotCoordinator,
    InvalidProducerEpoch,
    InvalidTxnState,
    InvalidProducerIdMapping,
    InvalidTransactionTimeout,
    ConcurrentTransactions,
    ConnectionNotFound,
    NotAuthorized,
    CoordinatorNotCurrent,
    NoPartitions,
    AssignorError,
    TopicNotExist,
}

impl ErrorCode {
    /// Whether a client may retry the same request, possibly after a back off.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::CoordinatorNotAvailable
                | Self::ConcurrentTransactions
                | Self::NotLeaderForPartition
                | Self::NoPartitions
        )
    }
}

impl TryFrom<i16> for ErrorCode {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::try_from(&value)
    }
}

impl TryFrom<&i16> for ErrorCode {
    type Error = Error;

    fn try_from(value: &i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::UnknownServerError),
            0 => Ok(Self::None),
            3 => Ok(Self::UnknownTopicOrPartition),
            6 => Ok(Self::NotLeaderForPartition),
            15 => Ok(Self::CoordinatorNotAvailable),
            16 => Ok(Self::NotCoordinator),
            47 => Ok(Self::InvalidProducerEpoch),
            48 => Ok(Self::InvalidTxnState),
            49 => Ok(Self::InvalidProducerIdMapping),
            50 => Ok(Self::InvalidTransactionTimeout),
            51 => Ok(Self::ConcurrentTransactions),
            1001 => Ok(Self::ConnectionNotFound),
            1002 => Ok(Self::NotAuthorized),
            1003 => Ok(Self::CoordinatorNotCurrent),
            1004 => Ok(Self::NoPartitions),
            1005 => Ok(Self::AssignorError),
            1006 => Ok(Self::TopicNotExist),
            otherwise => Err(Error::Message(format!("unknown error code: {otherwise}"))),
        }
    }
}

impl From<ErrorCode> for i16 {
    fn from(value: ErrorCode) -> Self {
        Self::from(&value)
    }
}

impl From<&ErrorCode> for i16 {
    fn from(value: &ErrorCode) -> Self {
        match value {
            ErrorCode::UnknownServerError => -1,
            ErrorCode::None => 0,
            ErrorCode::UnknownTopicOrPartition => 3,
            ErrorCode::NotLeaderForPartition => 6,
            ErrorCode::CoordinatorNotAvailable => 15,
            ErrorCode::NotCoordinator => 16,
            ErrorCode::InvalidProducerEpoch => 47,
            ErrorCode::InvalidTxnState => 48,
            ErrorCode::InvalidProducerIdMapping => 49,
            ErrorCode::InvalidTransactionTimeout => 50,
            ErrorCode::ConcurrentTransactions => 51,
            ErrorCode::ConnectionNotFound => 1001,
            ErrorCode::NotAuthorized => 1002,
            ErrorCode::CoordinatorNotCurrent => 1003,
            ErrorCode::NoPartitions => 1004,
            ErrorCode::AssignorError => 1005,
            ErrorCode::TopicNotExist => 1006,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::UnknownServerError => f.write_str(
                "The server experienced an unexpected error when processing the request.",
            ),
            ErrorCode::None => f.write_str("No error."),
            ErrorCode::UnknownTopicOrPartition => {
                f.write_str("This server does not host this topic-partition.")
            }
            ErrorCode::NotLeaderForPartition => {
                f.write_str("There is no leader for this topic-partition.")
            }
            ErrorCode::CoordinatorNotAvailable => {
                f.write_str("The coordinator is not available.")
            }
            ErrorCode::NotCoordinator => f.write_str("This is not the correct coordinator."),
            ErrorCode::InvalidProducerEpoch => f.write_str(
                "Producer attempted to use a producer epoch which is not the current one, or \
                 the transaction has expired.",
            ),
            ErrorCode::InvalidTxnState => f.write_str(
                "The producer attempted a transactional operation in an invalid state.",
            ),
            ErrorCode::InvalidProducerIdMapping => f.write_str(
                "The producer attempted to use a producer id which is not currently assigned \
                 to its transactional id.",
            ),
            ErrorCode::InvalidTransactionTimeout => f.write_str(
                "The transaction timeout is larger than the maximum value allowed by the \
                 coordinator.",
            ),
            ErrorCode::ConcurrentTransactions => f.write_str(
                "The producer attempted to update a transaction while another concurrent \
                 operation on the same transaction was ongoing.",
            ),
            ErrorCode::ConnectionNotFound => f.write_str("The connection does not exist."),
            ErrorCode::NotAuthorized => {
                f.write_str("The connection is not authorized for this application.")
            }
            ErrorCode::CoordinatorNotCurrent => {
                f.write_str("This coordinator does not currently own the group.")
            }
            ErrorCode::NoPartitions => f.write_str("No partitions are available to assign."),
            ErrorCode::AssignorError => f.write_str("The partition assignor failed."),
            ErrorCode::TopicNotExist => f.write_str("The topic does not exist."),
        }
    }
}
