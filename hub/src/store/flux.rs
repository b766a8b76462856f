use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;

/// Builder for the range → filter → pivot → sort pipeline the API runs.
///
/// Every caller-supplied value is rendered through [`flux_string`], so a
/// symbol taken from the URL is always a single string literal.
#[derive(Debug, Clone)]
pub struct FluxQuery {
    bucket: String,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    filters: Vec<(String, String)>,
    pivot_fields: bool,
    sort_by_time: bool,
}

impl FluxQuery {
    pub fn from_bucket(bucket: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self {
            bucket: bucket.to_string(),
            start,
            stop,
            filters: Vec::new(),
            pivot_fields: false,
            sort_by_time: false,
        }
    }

    /// Keep rows whose `column` equals `value`.
    pub fn filter_eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), value.to_string()));
        self
    }

    /// One wide row per `_time` with a column per `_field`.
    pub fn pivot_fields(mut self) -> Self {
        self.pivot_fields = true;
        self
    }

    pub fn sort_by_time(mut self) -> Self {
        self.sort_by_time = true;
        self
    }

    pub fn render(&self) -> String {
        let mut q = String::new();
        let _ = writeln!(q, "from(bucket: {})", flux_string(&self.bucket));
        let _ = writeln!(
            q,
            "  |> range(start: {}, stop: {})",
            flux_time(self.start),
            flux_time(self.stop)
        );
        for (column, value) in &self.filters {
            let _ = writeln!(
                q,
                "  |> filter(fn: (r) => r[{}] == {})",
                flux_string(column),
                flux_string(value)
            );
        }
        if self.pivot_fields {
            q.push_str(
                "  |> pivot(rowKey: [\"_time\"], columnKey: [\"_field\"], valueColumn: \"_value\")\n",
            );
        }
        if self.sort_by_time {
            q.push_str("  |> sort(columns: [\"_time\"], desc: false)\n");
        }
        q
    }
}

/// Render `raw` as a Flux string literal.
pub fn flux_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // `${` opens string interpolation in Flux.
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn flux_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
