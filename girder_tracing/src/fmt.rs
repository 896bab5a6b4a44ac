use crate::{FormatFlavor, LogOutput, TracingConfig};
use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Arc;
use tracing_core::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::format::{Compact, DefaultFields, Format, Pretty};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{FormatFields, Layer as FmtLayer, layer as make_fmt_layer};
use tracing_subscriber::layer::Filter;
use tracing_subscriber::registry::LookupSpan;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Creates a [formatted `Layer`](FmtLayer) from the given
/// [config](TracingConfig), filtered by its per-target verbosity.
///
/// Fails only when the configured output file cannot be opened.
pub fn make_layer<S>(config: impl AsRef<TracingConfig>) -> io::Result<BoxedLayer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let config = config.as_ref();
    let targets = make_targets(config);
    let writer = make_writer(config.output())?;

    Ok(match config.flavor() {
        FormatFlavor::Full => make_full_layer(config, targets, writer),
        FormatFlavor::Compact => make_compact_layer(config, targets, writer),
        FormatFlavor::Pretty => make_pretty_layer(config, targets, writer),
        #[cfg(feature = "json")]
        FormatFlavor::Json => make_json_layer(config, targets, writer),
    })
}

fn make_full_layer<S>(config: &TracingConfig, targets: Targets, writer: BoxMakeWriter) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    Targets: Filter<S>,
{
    let base_layer: FmtLayer<S, DefaultFields, Format, BoxMakeWriter> =
        preconfigure_base_layer(make_fmt_layer().with_writer(writer), config);

    if config.show_timestamp() {
        Box::new(base_layer.with_filter(targets))
    } else {
        Box::new(base_layer.without_time().with_filter(targets))
    }
}

fn make_compact_layer<S>(
    config: &TracingConfig,
    targets: Targets,
    writer: BoxMakeWriter,
) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    Targets: Filter<S>,
{
    let base_layer: FmtLayer<S, DefaultFields, Format<Compact>, BoxMakeWriter> =
        preconfigure_base_layer(make_fmt_layer().compact().with_writer(writer), config);

    if config.show_timestamp() {
        Box::new(base_layer.with_filter(targets))
    } else {
        Box::new(base_layer.without_time().with_filter(targets))
    }
}

fn make_pretty_layer<S>(
    config: &TracingConfig,
    targets: Targets,
    writer: BoxMakeWriter,
) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    Targets: Filter<S>,
{
    let base_layer: FmtLayer<S, Pretty, Format<Pretty>, BoxMakeWriter> =
        preconfigure_base_layer(make_fmt_layer().pretty().with_writer(writer), config);

    if config.show_timestamp() {
        Box::new(base_layer.with_filter(targets))
    } else {
        Box::new(base_layer.without_time().with_filter(targets))
    }
}

#[cfg(feature = "json")]
fn make_json_layer<S>(config: &TracingConfig, targets: Targets, writer: BoxMakeWriter) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    Targets: Filter<S>,
{
    use tracing_subscriber::fmt::format::{Json, JsonFields};

    let base_layer: FmtLayer<S, JsonFields, Format<Json>, BoxMakeWriter> = preconfigure_base_layer(
        make_fmt_layer()
            .json()
            .flatten_event(config.flatten_json())
            .with_writer(writer),
        config,
    );

    if config.show_timestamp() {
        Box::new(base_layer.with_filter(targets))
    } else {
        Box::new(base_layer.without_time().with_filter(targets))
    }
}

/// Applies the display toggles of the given [`config`](TracingConfig) to a
/// base layer of any flavor.
fn preconfigure_base_layer<S, N, L, T, W>(
    layer: FmtLayer<S, N, Format<L, T>, W>,
    config: &TracingConfig,
) -> FmtLayer<S, N, Format<L, T>, W>
where
    N: for<'writer> FormatFields<'writer> + 'static,
{
    // Escape codes only make sense on a terminal
    let color = config.color()
        && !config.flavor().is_machine_readable()
        && !matches!(config.output(), LogOutput::File(_));

    layer
        .with_ansi(color)
        .with_target(config.show_target())
        .with_file(config.show_file())
        .with_line_number(config.show_line_number())
        .with_level(config.show_level())
        .with_thread_ids(config.show_thread_id())
        .with_thread_names(config.show_thread_name())
}

fn make_writer(output: &LogOutput) -> io::Result<BoxMakeWriter> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(io::stderr),
        LogOutput::File(path) => {
            let file: Arc<File> = Arc::new(OpenOptions::new().create(true).append(true).open(path)?);
            BoxMakeWriter::new(file)
        }
    })
}

fn make_targets(config: &TracingConfig) -> Targets {
    Targets::new()
        .with_default(config.verbosity())
        .with_targets(config.targets())
}
