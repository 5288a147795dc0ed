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

use tracing_subscriber::{
    EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{Result, TracingFormat};

const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVE))
        .map_err(Into::into)
}

pub(super) fn init_tracing_subscriber(tracing_format: TracingFormat) -> Result<()> {
    match tracing_format {
        TracingFormat::Text => tracing_subscriber::registry()
            .with(env_filter()?)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_level(true)
                    .with_line_number(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::NONE),
            )
            .try_init()?,

        TracingFormat::Json => tracing_subscriber::registry()
            .with(env_filter()?)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    Ok(())
}
