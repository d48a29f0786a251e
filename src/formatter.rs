//! Custom `tracing` event formatters rendering a compact log grammar:
//! `event=<name> key=value ...`, nulls as `null`, booleans as `true`/`false`.

use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Collects an event's fields in declaration order, stringifying each value
/// (`null`, `true`/`false`, everything else via `Display`).
#[derive(Default)]
struct OrderedFields {
    pairs: Vec<(&'static str, String)>,
}

impl Visit for OrderedFields {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.pairs.push((field.name(), if value { "true".into() } else { "false".into() }));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.pairs.push((field.name(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.pairs.push((field.name(), value.to_string()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.pairs.push((field.name(), value.to_string()));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.pairs.push((field.name(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        // `%field` values come through here Debug-wrapped in quotes for
        // &str/String; strip one layer so `error=%e` reads like the rest.
        let rendered = rendered.strip_prefix('"').and_then(|s| s.strip_suffix('"')).map(str::to_string).unwrap_or(rendered);
        self.pairs.push((field.name(), rendered));
    }
}

/// Compact single-line formatter: `event=<name> key=value ...`.
pub struct EventFormatter;

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut fields = OrderedFields::default();
        event.record(&mut fields);

        let mut wrote_any = false;
        for (key, value) in &fields.pairs {
            if wrote_any {
                write!(writer, " ")?;
            }
            write!(writer, "{key}={value}")?;
            wrote_any = true;
        }
        if !wrote_any {
            write!(writer, "event={}", event.metadata().name())?;
        }
        writeln!(writer)
    }
}

/// JSON-lines formatter: same ordered fields plus `timestamp`/`level`.
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut fields = OrderedFields::default();
        event.record(&mut fields);

        let mut map = Map::new();
        map.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
        map.insert("level".to_string(), Value::String(event.metadata().level().to_string()));
        for (key, value) in fields.pairs {
            map.insert(key.to_string(), Value::String(value));
        }

        let rendered = serde_json::to_string(&Value::Object(map)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{rendered}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct VecWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for VecWriter {
        type Writer = VecWriter;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn event_formatter_renders_key_value_line() {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let writer = VecWriter(buf.clone());
        let subscriber = tracing_subscriber::fmt()
            .event_format(EventFormatter)
            .with_writer(writer)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(event = "task_start", item_id = 100, attempt = 1, active = true);
        });
        let out = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert_eq!(out.trim_end(), "event=task_start item_id=100 attempt=1 active=true");
    }
}
