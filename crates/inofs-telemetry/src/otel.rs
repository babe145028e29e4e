//! OTLP span export with per-operation sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::{ExporterBuildError, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider, ShouldSample};
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::sample_rate;

/// Exporter setup failed. Logging continues without export.
#[derive(Debug, thiserror::Error)]
pub enum OtelError {
    #[error("failed to start exporter runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("failed to build OTLP exporter: {0}")]
    Exporter(#[from] ExporterBuildError),
}

/// Flushes and shuts down the tracer provider on drop.
///
/// When the host had no Tokio runtime (a FUSE session loop usually runs on
/// plain threads) it also keeps the exporter's runtime entered.
pub struct OtelGuard {
    provider: SdkTracerProvider,
    // Field order: the enter guard drops before the runtime it borrows.
    _entered: Option<tokio::runtime::EnterGuard<'static>>,
    _runtime: Option<&'static tokio::runtime::Runtime>,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("inofs: span export shutdown failed: {e}");
        }
    }
}

/// The gRPC exporter needs a runtime to build and to run its batch task.
/// Reuse the caller's, or start a process-lifetime one.
fn exporter_with_runtime() -> Result<
    (
        SpanExporter,
        Option<&'static tokio::runtime::Runtime>,
        Option<tokio::runtime::EnterGuard<'static>>,
    ),
    OtelError,
> {
    if tokio::runtime::Handle::try_current().is_ok() {
        let exporter = SpanExporter::builder().with_tonic().build()?;
        return Ok((exporter, None, None));
    }
    let runtime: &'static tokio::runtime::Runtime =
        Box::leak(Box::new(tokio::runtime::Runtime::new()?));
    let entered = runtime.enter();
    let exporter = runtime.block_on(async { SpanExporter::builder().with_tonic().build() })?;
    Ok((exporter, Some(runtime), Some(entered)))
}

/// Build the OTLP layer for `tracing_subscriber::registry()` plus the guard
/// that flushes it.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, SdkTracer>, OtelGuard), OtelError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let (exporter, runtime, entered) = exporter_with_runtime()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(FsSampler)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();
    global::set_tracer_provider(provider.clone());

    let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("inofs"));
    Ok((
        layer,
        OtelGuard {
            provider,
            _entered: entered,
            _runtime: runtime,
        },
    ))
}

fn keep(trace_state: TraceState) -> SamplingResult {
    SamplingResult {
        decision: SamplingDecision::RecordAndSample,
        attributes: Vec::new(),
        trace_state,
    }
}

/// True for spans the bridge marked as failed.
fn marks_error(attributes: &[KeyValue]) -> bool {
    attributes.iter().any(|kv| match kv.key.as_str() {
        "otel.status_code" => kv.value.as_str() == "ERROR",
        "error" => kv.value.as_str() == "true",
        _ => false,
    })
}

/// Samples `fs.*` spans at [`sample_rate`].
///
/// Children of a sampled span are kept so a trace is never cut in half,
/// and spans marked as errors are always kept.
#[derive(Debug, Clone)]
struct FsSampler;

impl ShouldSample for FsSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let parent = parent_context.map(|cx| cx.span().span_context().clone());
        if let Some(parent) = parent.filter(|p| p.is_sampled()) {
            return keep(parent.trace_state().clone());
        }
        if marks_error(attributes) {
            return keep(TraceState::default());
        }
        Sampler::TraceIdRatioBased(sample_rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags};

    // The ratio sampler keys on the low 64 bits of the trace id: all-ones
    // is kept only at rate 1.0, all-zeros at any rate above 0.
    fn unlucky() -> TraceId {
        TraceId::from_bytes([0xff; 16])
    }

    fn lucky() -> TraceId {
        let mut bytes = [0; 16];
        bytes[0] = 1;
        TraceId::from_bytes(bytes)
    }

    fn decide(
        parent: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        attrs: &[KeyValue],
    ) -> SamplingDecision {
        FsSampler
            .should_sample(parent, trace_id, name, &SpanKind::Internal, attrs, &[])
            .decision
    }

    fn parent(flags: TraceFlags) -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from_bytes([7; 16]),
            SpanId::from_bytes([3; 8]),
            flags,
            true,
            TraceState::default(),
        ))
    }

    #[test]
    fn test_mutations_always_sampled() {
        for name in ["fs.rename", "fs.mkdir", "fs.init"] {
            assert_eq!(decide(None, unlucky(), name, &[]), SamplingDecision::RecordAndSample, "{name}");
        }
    }

    #[test]
    fn test_data_path_mostly_dropped() {
        for name in ["fs.read", "fs.write", "fs.readdir", "fs.forget"] {
            assert_eq!(decide(None, unlucky(), name, &[]), SamplingDecision::Drop, "{name}");
            assert_eq!(decide(None, lucky(), name, &[]), SamplingDecision::RecordAndSample, "{name}");
        }
        assert_eq!(decide(None, unlucky(), "fs.lookup", &[]), SamplingDecision::Drop);
    }

    #[test]
    fn test_errors_always_sampled() {
        let status = [KeyValue::new("otel.status_code", "ERROR")];
        let flag = [KeyValue::new("error", "true")];
        let ok = [KeyValue::new("otel.status_code", "OK")];
        assert_eq!(decide(None, unlucky(), "fs.read", &status), SamplingDecision::RecordAndSample);
        assert_eq!(decide(None, unlucky(), "fs.read", &flag), SamplingDecision::RecordAndSample);
        assert_eq!(decide(None, unlucky(), "fs.read", &ok), SamplingDecision::Drop);
    }

    #[test]
    fn test_sampled_parent_is_inherited() {
        let sampled = parent(TraceFlags::SAMPLED);
        assert_eq!(
            decide(Some(&sampled), unlucky(), "fs.read", &[]),
            SamplingDecision::RecordAndSample
        );

        let unsampled = parent(TraceFlags::default());
        assert_eq!(decide(Some(&unsampled), unlucky(), "fs.read", &[]), SamplingDecision::Drop);
    }
}
