use anyhow::Context as _;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use crate::util::config::LogFormat;

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> opentelemetry::trace::TraceId {
    use opentelemetry::trace::TraceContextExt as _; // opentelemetry::Context -> opentelemetry::trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span to opentelemetry::Context

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

#[cfg(feature = "telemetry")]
async fn init_tracer() -> anyhow::Result<opentelemetry::sdk::trace::Tracer> {
    let otlp_endpoint = std::env::var("OPENTELEMETRY_ENDPOINT_URL")
        .context("OPENTELEMETRY_ENDPOINT_URL must point at a tracing collector")?;

    let channel = tonic::transport::Channel::from_shared(otlp_endpoint)?
        .connect()
        .await
        .context("failed to connect to the tracing collector")?;

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_channel(channel))
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(
            opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                "metal-cluster-controller",
            )]),
        ))
        .install_batch(opentelemetry::runtime::Tokio)?;
    Ok(tracer)
}

/// Initialize tracing
pub async fn init(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or(EnvFilter::try_new("info"))
        .context("invalid log filter")?;

    // exactly one of the two formatters is installed
    let (compact, json) = match format {
        LogFormat::Compact => (Some(tracing_subscriber::fmt::layer().compact()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    let collector = Registry::default().with(compact).with(json).with(env_filter);

    #[cfg(feature = "telemetry")]
    let collector = collector.with(tracing_opentelemetry::layer().with_tracer(init_tracer().await?));

    tracing::subscriber::set_global_default(collector).context("tracing was already initialized")?;
    Ok(())
}
