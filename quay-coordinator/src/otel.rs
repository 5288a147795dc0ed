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

//! Logging and metrics
//!
//! Installs the global `tracing` subscriber in the configured format and,
//! when an OTLP endpoint is configured, a periodic exporter for the metrics
//! recorded by the coordinators.

use ::tracing::debug;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{Protocol, WithExportConfig as _};
use opentelemetry_sdk::{Resource, metrics::SdkMeterProvider};
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;
use url::Url;

use crate::{Config, Result};

mod tracing;

/// Shuts down the meter provider, exporting any pending metrics, when dropped.
#[derive(Debug, Default)]
pub struct Guard {
    meter_provider: Option<SdkMeterProvider>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(meter_provider) = self.meter_provider.take()
            && let Err(err) = meter_provider.shutdown()
        {
            eprintln!("{err:?}")
        }
    }
}

pub fn init(config: &Config) -> Result<Guard> {
    tracing::init_tracing_subscriber(config.tracing_format)?;

    config
        .otlp_endpoint_url
        .clone()
        .map(|otlp_endpoint_url| meter_provider(otlp_endpoint_url, env!("CARGO_PKG_NAME")))
        .transpose()
        .map(|meter_provider| Guard { meter_provider })
}

fn meter_provider(
    otlp_endpoint_url: Url,
    service_name: impl Into<String>,
) -> Result<SdkMeterProvider> {
    otlp_endpoint_url
        .join("v1/metrics")
        .inspect(|endpoint| debug!(%endpoint))
        .map_err(Into::into)
        .and_then(|endpoint| {
            opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_protocol(Protocol::HttpBinary)
                .with_endpoint(endpoint.to_string())
                .build()
                .map_err(Into::into)
        })
        .map(|exporter| {
            let meter_provider = SdkMeterProvider::builder()
                .with_periodic_exporter(exporter)
                .with_resource(
                    Resource::builder_empty()
                        .with_attributes([KeyValue::new(SERVICE_NAME, service_name.into())])
                        .build(),
                )
                .build();

            global::set_meter_provider(meter_provider.clone());

            meter_provider
        })
}
