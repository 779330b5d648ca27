//! CLI Output Formatting.
//!
//! Handles output formatting for text and JSON.

use console::style;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::oracle::{AggregateResult, DeviationReport, ExclusionReason, Source, SourceSample};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
    /// Pretty JSON format
    JsonPretty,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Whether output is machine readable
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonPretty)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMATTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Output formatter for CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create new formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Get format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.format.is_json() {
            self.print_json(&serde_json::json!({ "status": "success", "message": message }));
        } else {
            println!("{} {}", style("✓").green(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.format.is_json() {
            self.print_json(&serde_json::json!({ "status": "warning", "message": message }));
        } else {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print section header (text only)
    pub fn section(&self, title: &str) {
        if !self.format.is_json() {
            println!("{} {}", style("→").cyan(), style(title).bold());
        }
    }

    /// Print any serializable value
    pub fn data<T: Serialize>(&self, data: &T) {
        if self.format.is_json() {
            self.print_json(data);
        } else if let Ok(json) = serde_json::to_value(data) {
            self.print_text(&json, 1);
        }
    }

    /// Print table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.format.is_json() {
            let data: Vec<BTreeMap<&str, &str>> = rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, v)| (*h, v.as_str()))
                        .collect()
                })
                .collect();
            self.print_json(&data);
        } else {
            for line in render_table(headers, rows) {
                println!("  {}", line);
            }
        }
    }

    /// Print the sources table
    pub fn sources(&self, sources: &[Source]) {
        if self.format.is_json() {
            self.print_json(&sources);
            return;
        }
        if sources.is_empty() {
            println!("  (no sources registered)");
            return;
        }
        self.table(&["ID", "WEIGHT", "MAX AGE", "STATUS"], &source_rows(sources));
    }

    /// Print live samples
    pub fn samples(&self, samples: &[SourceSample]) {
        if self.format.is_json() {
            self.print_json(&samples);
            return;
        }
        let rows: Vec<Vec<String>> = samples
            .iter()
            .map(|s| {
                vec![
                    s.source.to_string(),
                    s.sample.price.to_string(),
                    s.sample.timestamp.to_string(),
                    s.sample.confidence_bps.to_string(),
                ]
            })
            .collect();
        self.table(&["ID", "PRICE", "TIMESTAMP", "CONFIDENCE BPS"], &rows);
    }

    /// Print an aggregate result
    pub fn aggregate(&self, result: &AggregateResult) {
        if self.format.is_json() {
            self.print_json(result);
            return;
        }
        println!("  Price: {}", style(result.price).green().bold());
        println!("  Computed at: {}", result.computed_at);
        println!(
            "  Sources: {} (total weight {} bps)",
            style(result.contributing_sources.len()).cyan(),
            result.total_weight
        );
        for excluded in &result.excluded_sources {
            println!(
                "  {} {} excluded: {}",
                style("●").red(),
                excluded.source,
                describe_exclusion(&excluded.reason)
            );
        }
    }

    /// Print a deviation report
    pub fn deviation(&self, report: &DeviationReport) {
        if self.format.is_json() {
            self.print_json(report);
            return;
        }
        let verdict = if report.exceeded {
            style("EXCEEDED").red().bold()
        } else {
            style("within threshold").green()
        };
        println!("  Candidate: {}", report.candidate);
        println!("  Baseline: {}", report.baseline);
        println!(
            "  Deviation: {} bps (threshold {} bps) {}",
            report.deviation_bps, report.threshold_bps, verdict
        );
    }

    fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        let output = if matches!(self.format, OutputFormat::JsonPretty) {
            serde_json::to_string_pretty(data)
        } else {
            serde_json::to_string(data)
        };

        if let Ok(json) = output {
            println!("{}", json);
        }
    }

    fn print_text(&self, json: &serde_json::Value, indent: usize) {
        let prefix = "  ".repeat(indent);

        match json {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                            println!("{}{}:", prefix, style(key).bold());
                            self.print_text(value, indent + 1);
                        }
                        _ => println!("{}{}: {}", prefix, style(key).bold(), format_value(value)),
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for (i, item) in arr.iter().enumerate() {
                    println!("{}[{}]:", prefix, i);
                    self.print_text(item, indent + 1);
                }
            }
            _ => println!("{}{}", prefix, format_value(json)),
        }
    }
}

/// Table rows for a source listing
pub fn source_rows(sources: &[Source]) -> Vec<Vec<String>> {
    sources
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.weight.to_string(),
                format!("{}s", s.max_staleness_secs),
                if s.is_active { "active" } else { "inactive" }.to_string(),
            ]
        })
        .collect()
}

/// One-line description of why a source was excluded
pub fn describe_exclusion(reason: &ExclusionReason) -> String {
    match reason {
        ExclusionReason::Stale {
            age_secs,
            max_staleness_secs,
        } => format!("stale ({}s old, max {}s)", age_secs, max_staleness_secs),
        ExclusionReason::Timeout { timeout_ms } => format!("timed out after {}ms", timeout_ms),
        ExclusionReason::Failed(reason) => format!("failed: {}", reason),
    }
}

/// Lay out a table as aligned text lines
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    if headers.is_empty() {
        return Vec::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(cell.len());
                format!("{:width$}", cell, width = width)
            })
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(line(headers.iter().map(|h| h.to_string()).collect()));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in rows {
        lines.push(line(row.clone()));
    }
    lines
}

/// Format a JSON value for text output
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".into(),
        serde_json::Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}
