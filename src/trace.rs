use tracing::span::{Attributes, Id, Record};
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use chrono::Local;
use console::{style, Term};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone)]
struct TraceNode {
    level: Level,
    name: String,
    module_path: Option<String>,
    line: Option<u32>,
    fields: Vec<(String, String)>,
    start_time: Option<Instant>,
    took: Option<u128>, // Duration in microseconds
}

impl Visit for TraceNode {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields
            .push((field.name().to_string(), format!("{:?}", value)));
    }
}

impl TraceNode {
    fn new(level: Level, name: String, module_path: Option<String>, line: Option<u32>) -> Self {
        Self {
            level,
            name,
            module_path,
            line,
            fields: Vec::new(),
            start_time: None,
            took: None,
        }
    }

    fn duration_text(&self) -> String {
        match self.took {
            Some(micros) if micros >= 1000 => format!("{}ms", micros / 1000),
            Some(micros) => format!("{}us", micros),
            None => String::new(),
        }
    }

    fn format_message(&self) -> String {
        let mut parts = Vec::new();

        // Spans are named in cyan, events carry a message instead
        if self.took.is_some() {
            parts.push(style(&self.name).cyan().to_string());
        }

        if let Some((_, msg)) = self.fields.iter().find(|(k, _)| k == "message") {
            parts.push(style(msg.trim_matches('"')).italic().to_string());
        }

        let fields: String = self
            .fields
            .iter()
            .filter(|(k, _)| k != "message")
            .map(|(k, v)| format!("{}={}", k, v.trim_matches('"')))
            .collect::<Vec<_>>()
            .join(" ");

        if !fields.is_empty() {
            parts.push(fields);
        }

        parts.join(" ")
    }
}

/// Writes events to stderr as they happen, indented under the span they
/// belong to, and each span once more with its running time when it closes.
#[derive(Clone)]
pub struct StderrLayer {
    spans: Arc<Mutex<HashMap<Id, (TraceNode, usize)>>>,
}

impl StderrLayer {
    pub fn new() -> Self {
        StderrLayer {
            spans: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn format_trace_node(&self, node: &TraceNode, depth: usize) -> String {
        let formatted_time = Local::now().format("%H:%M:%S%.3f").to_string();

        let loc = match (&node.module_path, node.line) {
            (Some(module_path), Some(line)) => format!("{}:{}", module_path, line),
            (Some(module_path), None) => module_path.clone(),
            _ => String::new(),
        };

        let prefix = if depth > 0 {
            format!("{}└─ ", "│   ".repeat(depth - 1))
        } else {
            String::new()
        };

        let mut message = format!(
            "{} {:>5} {:>7} {}{}",
            formatted_time,
            node.level,
            node.duration_text(),
            prefix,
            node.format_message()
        );

        // Right-align the location when stderr is a terminal
        let term = Term::stderr();
        if term.is_term() {
            let terminal_width = term.size().1 as usize;
            let content_width =
                console::measure_text_width(&message) + console::measure_text_width(&loc);
            let padding = " ".repeat(terminal_width.saturating_sub(content_width + 1));
            message.push_str(&padding);
            message.push(' ');
            message.push_str(&loc);
        }

        message
    }
}

impl Default for StderrLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for StderrLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let metadata = attrs.metadata();

        let mut node = TraceNode::new(
            *metadata.level(),
            metadata.name().to_string(),
            metadata.module_path().map(ToString::to_string),
            metadata.line(),
        );
        attrs.record(&mut node);

        let depth = ctx.span(id).map(|span| span.scope().count() - 1).unwrap_or(0);

        let mut spans = self.spans.lock().unwrap();
        spans.insert(id.clone(), (node, depth));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut spans = self.spans.lock().unwrap();
        if let Some((node, _)) = spans.get_mut(id) {
            values.record(node);
        }
    }

    fn on_enter(&self, id: &Id, _ctx: Context<'_, S>) {
        let mut spans = self.spans.lock().unwrap();
        if let Some((node, _)) = spans.get_mut(id) {
            node.start_time = Some(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, _ctx: Context<'_, S>) {
        let mut spans = self.spans.lock().unwrap();
        if let Some((node, _)) = spans.get_mut(id) {
            if let Some(start_time) = node.start_time.take() {
                let elapsed = start_time.elapsed().as_micros();
                node.took = Some(node.took.unwrap_or(0) + elapsed);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut event_node = TraceNode::new(
            *metadata.level(),
            metadata.name().to_string(),
            metadata.module_path().map(ToString::to_string),
            metadata.line(),
        );
        event.record(&mut event_node);

        let depth = ctx
            .event_scope(event)
            .map(|scope| scope.count())
            .unwrap_or(0);

        eprintln!("{}", self.format_trace_node(&event_node, depth));
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        let mut spans = self.spans.lock().unwrap();
        if let Some((node, depth)) = spans.remove(&id) {
            eprintln!("{}", self.format_trace_node(&node, depth));
        }
    }
}

/// Map a `-v` count to the most verbose level shown. Warnings and errors are
/// always shown.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub fn init(verbosity: u8) {
    let layer = StderrLayer::new().with_filter(level_for(verbosity));
    let registry = Registry::default().with(layer);
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing::subscriber::set_global_default(registry);
}
