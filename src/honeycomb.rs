use anyhow::Context;
use opentelemetry::sdk::trace::Tracer;
use opentelemetry_otlp::WithExportConfig;

use crate::configuration::HoneycombConfiguration;

const HONEYCOMB_ENDPOINT: &str = "https://api.honeycomb.io";

pub fn get_honeycomb_tracer(config: &HoneycombConfiguration) -> anyhow::Result<Tracer> {
    let mut map = tonic::metadata::MetadataMap::with_capacity(2);

    map.insert(
        "x-honeycomb-team",
        config
            .api_key
            .expose()
            .parse()
            .context("Honeycomb API key is not a valid header value")?,
    );
    map.insert(
        "x-honeycomb-dataset",
        config
            .dataset
            .parse()
            .context("Honeycomb dataset is not a valid header value")?,
    );
    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(HONEYCOMB_ENDPOINT)
        .with_metadata(map);
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp_exporter)
        .install_simple()
        .context("Failed to install the Honeycomb exporter")
}
