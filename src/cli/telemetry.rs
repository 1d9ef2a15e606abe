//! Process-wide tracing.
//!
//! Logs go to a pretty `fmt` layer whose filter depends on the verbosity and
//! on the backend in use. When `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans
//! are also exported over OTLP/gRPC, tagged with what this process runs.

use crate::cli::commands::{auth, backend};
use anyhow::{anyhow, Result};
use base64ct::{Base64, Encoding};
use opentelemetry::{
    global,
    propagation::TextMapCompositePropagator,
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::{env::var, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;
use url::Url;

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// What this process runs and against which backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    pub command: &'static str,
    pub backend: &'static str,
    pub auth_host: Option<String>,
    pub public_url: String,
}

impl ServiceContext {
    #[must_use]
    pub fn new(command: &'static str, backend: &backend::Options, auth: &auth::Options) -> Self {
        Self {
            command,
            backend: backend.kind(),
            auth_host: backend.auth_host(),
            public_url: auth.public_url.clone(),
        }
    }

    fn is_hosted(&self) -> bool {
        self.backend == backend::BACKEND_SUPABASE
    }

    fn attributes(&self, instance_id: String) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", instance_id),
            KeyValue::new("vcs.ref.head.revision", crate::GIT_COMMIT_HASH),
            KeyValue::new("lessonhub.command", self.command),
            KeyValue::new("lessonhub.backend", self.backend),
            KeyValue::new("lessonhub.public_url", self.public_url.clone()),
        ];
        if let Some(host) = &self.auth_host {
            attributes.push(KeyValue::new("lessonhub.auth.host", host.clone()));
        }
        attributes
    }

    /// Per-target levels applied on top of the verbosity default.
    ///
    /// With the hosted backend the database driver and the HTTP client stay
    /// at `warn` (queries are already covered by `db.query` spans) and
    /// request traces are capped at `info`. The in-memory backend has
    /// neither, and request traces follow the verbosity.
    fn directives(&self, level: Level) -> Vec<String> {
        let mut directives: Vec<String> = ["hyper=error", "h2=error", "tokio=error", "opentelemetry_sdk=warn"]
            .into_iter()
            .map(String::from)
            .collect();
        if self.is_hosted() {
            directives.push("sqlx=warn".to_string());
            directives.push("reqwest=warn".to_string());
            directives.push(format!("tower_http={}", level_name(level.min(Level::INFO))));
        } else {
            directives.push(format!("tower_http={}", level_name(level)));
        }
        directives
    }
}

fn level_name(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

fn filter(context: &ServiceContext, level: Level) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    for directive in context.directives(level) {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Exporter settings read from the standard `OTEL_EXPORTER_OTLP_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: String,
    ignored_protocol: Option<String>,
}

impl OtlpSettings {
    /// `None` unless an endpoint is configured.
    fn from_env() -> Option<Self> {
        let endpoint = var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty())?;
        Some(Self {
            endpoint: with_scheme(endpoint.trim()),
            headers: var("OTEL_EXPORTER_OTLP_HEADERS").unwrap_or_default(),
            ignored_protocol: var("OTEL_EXPORTER_OTLP_PROTOCOL")
                .ok()
                .filter(|protocol| protocol != "grpc"),
        })
    }

    /// TLS server name for `https` endpoints.
    fn tls_domain(&self) -> Option<String> {
        let url = Url::parse(&self.endpoint).ok()?;
        if url.scheme() != "https" {
            return None;
        }
        url.host_str().map(ToString::to_string)
    }
}

/// Bare `host:port` endpoints are reached over TLS.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

/// gRPC metadata from `key=value,key=value`. Keys ending in `-bin` carry
/// base64 and are sent as binary metadata; pairs without `=` are skipped.
fn metadata_from_headers(raw: &str) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::new();
    for (key, value) in raw.split(',').filter_map(|pair| pair.split_once('=')) {
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }

        if key.ends_with("-bin") {
            let bytes = Base64::decode_vec(value)
                .map_err(|err| anyhow!("failed to base64-decode OTLP header {key}: {err}"))?;
            let name = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid OTLP header name {key}: {err}"))?;
            metadata.insert_bin(name, MetadataValue::from_bytes(&bytes));
        } else {
            let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid OTLP header name {key}: {err}"))?;
            let value: MetadataValue<Ascii> = value
                .parse()
                .map_err(|err| anyhow!("invalid OTLP header value for {key}: {err}"))?;
            metadata.insert(name, value);
        }
    }
    Ok(metadata)
}

fn init_tracer(settings: &OtlpSettings, context: &ServiceContext) -> Result<Tracer> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&settings.endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(domain) = settings.tls_domain() {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain)
                .with_native_roots(),
        );
    }

    let metadata = metadata_from_headers(&settings.headers)?;
    if !metadata.is_empty() {
        builder = builder.with_metadata(metadata);
    }

    let exporter = builder.build()?;
    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(context.attributes(instance_id))
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber for `context`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built, a filter directive is
/// invalid, or a global subscriber is already set.
pub fn init(verbosity_level: Option<Level>, context: &ServiceContext) -> Result<()> {
    let level = verbosity_level.unwrap_or(Level::ERROR);
    let otlp = OtlpSettings::from_env();

    let otel_layer = match &otlp {
        Some(settings) => {
            Some(tracing_opentelemetry::layer().with_tracer(init_tracer(settings, context)?))
        }
        None => None,
    };

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter(context, level)?);
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(settings) = otlp {
        if let Some(protocol) = settings.ignored_protocol {
            warn!(%protocol, "OTEL_EXPORTER_OTLP_PROTOCOL ignored, spans are exported over gRPC");
        }
        debug!(endpoint = %settings.endpoint, backend = context.backend, "exporting spans");
    }
    Ok(())
}

/// Flush pending spans. Does nothing when export was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("flushing exported spans");
        if let Err(err) = provider.shutdown() {
            warn!("Failed to shut down the tracer provider: {err}");
        }
    }
}
