//! Span capture for asserting on wardcache instrumentation.
//!
//! Only spans named `wardcache.*` and `offload_task` are recorded.

use std::sync::{Arc, Mutex};

use tracing::Dispatch;
use tracing::dispatcher::DefaultGuard;
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// A recorded span.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub id: u64,
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedSpan {
    /// Value of a captured field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn set(&mut self, name: &str, value: String) {
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }
}

fn is_captured(name: &str) -> bool {
    name.starts_with("wardcache.") || name == "offload_task"
}

/// Layer recording wardcache spans into a shared list.
pub struct SpanCaptureLayer {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

struct FieldVisitor<'a>(&'a mut CapturedSpan);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.set(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.set(field.name(), value.to_string());
    }
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let name = attrs.metadata().name();
        if !is_captured(name) {
            return;
        }
        let mut span = CapturedSpan {
            id: id.into_u64(),
            name: name.to_string(),
            fields: Vec::new(),
        };
        attrs.record(&mut FieldVisitor(&mut span));
        self.spans.lock().unwrap().push(span);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let id = id.into_u64();
        let mut spans = self.spans.lock().unwrap();
        if let Some(span) = spans.iter_mut().rev().find(|span| span.id == id) {
            values.record(&mut FieldVisitor(span));
        }
    }

    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {}
}

/// Collector for captured spans.
#[derive(Clone)]
pub struct SpanCollector {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    dispatch: Dispatch,
}

/// Creates a collector with its own subscriber.
pub fn create_span_collector() -> SpanCollector {
    let spans = Arc::new(Mutex::new(Vec::new()));
    let layer = SpanCaptureLayer {
        spans: spans.clone(),
    };
    let dispatch = Dispatch::new(Registry::default().with(layer));
    SpanCollector { spans, dispatch }
}

impl SpanCollector {
    /// The collector's dispatch.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Makes the collector the default subscriber of the current thread
    /// until the guard is dropped.
    ///
    /// On a current-thread runtime this covers spawned tasks too.
    pub fn set_default(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    /// All captured spans, in creation order.
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().unwrap().clone()
    }

    /// Captured span names, in creation order.
    pub fn span_names(&self) -> Vec<String> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Spans with the given name.
    pub fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Check if a span with the given name was captured.
    pub fn has_span(&self, name: &str) -> bool {
        self.spans.lock().unwrap().iter().any(|s| s.name == name)
    }

    /// Field value of the last span with the given name.
    pub fn get_field(&self, span_name: &str, field_name: &str) -> Option<String> {
        self.named(span_name)
            .last()
            .and_then(|span| span.field(field_name).map(String::from))
    }

    /// Clear all captured spans.
    pub fn clear(&self) {
        self.spans.lock().unwrap().clear();
    }

    /// Assert that the given spans appear in order, allowing other spans in
    /// between.
    pub fn assert_span_sequence(&self, expected: &[&str]) {
        let names = self.span_names();
        let mut expected_iter = expected.iter();
        let mut current_expected = expected_iter.next();

        for name in &names {
            if let Some(exp) = current_expected
                && name == *exp
            {
                current_expected = expected_iter.next();
            }
        }

        if current_expected.is_some() {
            panic!("Expected span sequence {:?} but got {:?}", expected, names);
        }
    }
}

/// Runs a closure with span capturing enabled.
pub fn with_span_capture<F, R>(f: F) -> (R, SpanCollector)
where
    F: FnOnce() -> R,
{
    let collector = create_span_collector();
    let result = tracing::dispatcher::with_default(collector.dispatch(), f);
    (result, collector)
}
