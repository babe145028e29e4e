//! Tracing setup for inofs.
//!
//! [`init_tracing`] installs the subscriber every inofs binary and test
//! harness uses: an `EnvFilter` (default `info`, override with `RUST_LOG`)
//! and a `fmt` layer on stderr. With the `telemetry` feature, spans are
//! also exported over OTLP when the standard OTel environment asks for it:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 RUST_LOG=inofs_kernel=debug my-fuse-host
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.
//! If the exporter cannot be built, logging continues on stderr and the
//! failure is logged at warn.
//!
//! The sampler tests need the feature: `cargo test -p inofs-telemetry --features telemetry`.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelError, OtelGuard, otel_layer};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps exporters alive. Hold it for the lifetime of the process.
#[must_use = "dropping the guard stops span export"]
pub struct TracingGuard {
    #[cfg(feature = "telemetry")]
    _otel: Option<OtelGuard>,
}

/// Install the global subscriber.
///
/// A second call leaves the first subscriber in place.
pub fn init_tracing(service_name: &str) -> TracingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    if otel_enabled() {
        match otel::otel_layer(service_name) {
            Ok((otel_layer, guard)) => {
                let _ = registry.with(otel_layer).try_init();
                return TracingGuard { _otel: Some(guard) };
            }
            Err(e) => {
                let _ = registry.try_init();
                tracing::warn!(error = %e, "span export disabled");
                return TracingGuard { _otel: None };
            }
        }
    }

    let _ = registry.try_init();
    tracing::debug!(service = service_name, "tracing initialized");
    TracingGuard {
        #[cfg(feature = "telemetry")]
        _otel: None,
    }
}

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    if std::env::var("OTEL_SDK_DISABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return false;
    }

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        return true;
    }

    if let Ok(exporter) = std::env::var("OTEL_TRACES_EXPORTER") {
        return !exporter.eq_ignore_ascii_case("none");
    }

    false
}

/// Sampling rate for a span, keyed on the bridge's `fs.<op>` span names.
///
/// | Spans                                   | Rate | Rationale                    |
/// |-----------------------------------------|------|------------------------------|
/// | `fs.init`, `fs.destroy`                 | 100% | Once per session             |
/// | namespace and attribute mutations       | 100% | Change the tree; rare        |
/// | `fs.read`, `fs.write`, `fs.readdir`     |  1%  | Very high volume data I/O    |
/// | `fs.forget`                             |  1%  | Very high volume, advisory   |
/// | other `fs.*`                            | 10%  | Lookups and attribute reads  |
/// | other                                   | 10%  | Default for unclassified     |
pub fn sample_rate(span_name: &str) -> f64 {
    let Some(op) = span_name.strip_prefix("fs.") else {
        return 0.1;
    };
    match op {
        "init" | "destroy" | "mknod" | "mkdir" | "create" | "symlink" | "link" | "unlink"
        | "rmdir" | "rename" | "setattr" | "setxattr" | "removexattr" => 1.0,
        "read" | "write" | "readdir" | "forget" => 0.01,
        _ => 0.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rates() {
        assert_eq!(sample_rate("fs.rename"), 1.0);
        assert_eq!(sample_rate("fs.init"), 1.0);
        assert_eq!(sample_rate("fs.read"), 0.01);
        assert_eq!(sample_rate("fs.lookup"), 0.1);
        assert_eq!(sample_rate("memfs"), 0.1);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let _a = init_tracing("inofs-test");
        let _b = init_tracing("inofs-test");
        tracing::info!("still logging");
    }
}
