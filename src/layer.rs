use crate::handler::{CloudLogHandler, Handler};
use crate::init::LayerConfig;
use crate::record::{Record, SourceLocation};
use crate::value::{Attr, Value};
use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{span, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::{LookupSpan, SpanRef};

/// `tracing_subscriber` layer that turns events into [`Record`]s and
/// hands them to a [`Handler`].
///
/// Every span gets its own derived handler, stored in the span's
/// extensions: span fields become inherited attributes and, when
/// `group_spans` is set, the span name becomes a group. Events are
/// handled by the handler of their innermost span, or by the root
/// handler outside of any span.
///
/// Level filtering is left to the handler so that other layers of the
/// same subscriber keep seeing every event.
pub struct CloudLogLayer<H = CloudLogHandler> {
    root: H,
    group_spans: bool,
    excluded_targets: Vec<String>,
}

struct SpanHandler<H>(H);

impl<H> CloudLogLayer<H>
where
    H: Handler + Clone + 'static,
{
    pub fn new(root: H) -> Self {
        Self::with_config(root, &LayerConfig::default())
    }

    pub fn with_config(root: H, config: &LayerConfig) -> Self {
        Self {
            root,
            group_spans: config.group_spans,
            excluded_targets: config.excluded_targets.clone(),
        }
    }

    /// Handler used for events outside of any span.
    pub fn root(&self) -> &H {
        &self.root
    }

    /// A target is excluded when it is one of the configured crate names
    /// or a module path below one.
    fn is_excluded(&self, target: &str) -> bool {
        self.excluded_targets
            .iter()
            .any(|name| is_within(target, name))
    }

    fn handler_of<S>(&self, span: Option<SpanRef<'_, S>>) -> H
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let span = match span {
            Some(span) => span,
            None => return self.root.clone(),
        };
        let extensions = span.extensions();
        let handler = extensions.get::<SpanHandler<H>>().map(|h| h.0.clone());
        handler.unwrap_or_else(|| self.root.clone())
    }
}

impl<S, H> Layer<S> for CloudLogLayer<H>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    H: Handler + Clone + 'static,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };
        let parent = self.handler_of(span.parent());

        let handler = if self.is_excluded(span.metadata().target()) {
            parent
        } else {
            let mut fields = Vec::new();
            attrs.record(&mut FieldVisitor::new(&mut fields, None));
            let grouped = if self.group_spans {
                parent.with_group(span.name())
            } else {
                parent
            };
            grouped.with_attrs(fields)
        };

        span.extensions_mut().insert(SpanHandler(handler));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };
        if self.is_excluded(span.metadata().target()) {
            return;
        }

        let mut fields = Vec::new();
        values.record(&mut FieldVisitor::new(&mut fields, None));
        if fields.is_empty() {
            return;
        }

        let mut extensions = span.extensions_mut();
        if let Some(SpanHandler(handler)) = extensions.get_mut::<SpanHandler<H>>() {
            *handler = handler.with_attrs(fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_excluded(metadata.target()) {
            return;
        }

        let handler = self.handler_of(ctx.event_span(event));
        let level = *metadata.level();
        if !handler.enabled(level) {
            return;
        }

        let mut attrs = Vec::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor::new(&mut attrs, Some(&mut message)));

        let record = Record {
            timestamp: Utc::now(),
            level,
            message: message.unwrap_or_default(),
            attrs,
            source: Some(SourceLocation {
                file: metadata.file().map(str::to_string),
                line: metadata.line(),
                module_path: metadata.module_path().map(str::to_string),
            }),
        };

        if let Err(e) = handler.handle(record) {
            eprintln!("dropping log record: {}", e);
        }
    }
}

fn is_within(target: &str, name: &str) -> bool {
    match target.strip_prefix(name) {
        Some(rest) => rest.is_empty() || rest.starts_with("::"),
        None => false,
    }
}

/// Collects `tracing` fields as [`Attr`]s. The `message` field is
/// captured separately when a slot for it is given.
struct FieldVisitor<'a> {
    attrs: &'a mut Vec<Attr>,
    message: Option<&'a mut Option<String>>,
}

impl<'a> FieldVisitor<'a> {
    fn new(attrs: &'a mut Vec<Attr>, message: Option<&'a mut Option<String>>) -> Self {
        Self { attrs, message }
    }

    fn push(&mut self, field: &Field, value: Value) {
        let name = field.name();
        // normalized metadata from tracing-log
        if name.starts_with("log.") {
            return;
        }
        if name == "message" {
            if let Some(slot) = self.message.as_deref_mut() {
                *slot = Some(match value {
                    Value::String(s) | Value::Debug(s) | Value::Error(s) => s,
                    other => other.to_json().to_string(),
                });
                return;
            }
        }
        self.attrs.push(Attr {
            key: name.to_string(),
            value,
        });
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, Value::debug(value));
    }
}
