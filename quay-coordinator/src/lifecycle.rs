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

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::{Error, ErrorCode, Result};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum State {
    #[default]
    Created,
    Running,
    Stopped,
}

/// Shared lifecycle of the coordinators.
///
/// A coordinator only serves requests while [`State::Running`].
#[derive(Clone, Debug, Default)]
pub struct Lifecycle {
    state: Arc<Mutex<State>>,
}

impl Lifecycle {
    pub fn state(&self) -> Result<State> {
        self.state.lock().map(|state| *state).map_err(Into::into)
    }

    pub fn start(&self) -> Result<()> {
        self.transition(State::Created, State::Running)
    }

    pub fn stop(&self) -> Result<()> {
        self.transition(State::Running, State::Stopped)
    }

    pub fn is_running(&self) -> bool {
        self.state()
            .is_ok_and(|state| state == State::Running)
    }

    /// Fail fast with [`ErrorCode::CoordinatorNotAvailable`] unless running.
    pub fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::Api(ErrorCode::CoordinatorNotAvailable))
        }
    }

    fn transition(&self, from: State, to: State) -> Result<()> {
        let mut state = self.state.lock()?;
        debug!(current = ?*state, ?from, ?to);

        if *state == from {
            *state = to;
            info!(?from, ?to);
            Ok(())
        } else {
            Err(Error::Message(format!(
                "illegal lifecycle transition from {:?} to {to:?}",
                *state
            )))
        }
    }
}
