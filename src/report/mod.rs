//! Rendering of scan verdicts.
//!
//! Every formatter shows an engine that reported no threat as `Clean`,
//! never as an empty label.

use crate::core::ScanVerdict;

use serde_json::json;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

/// Output formats for verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// Human-readable, one block per engine.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Returns the formatter for this format.
    pub fn formatter(self) -> Box<dyn VerdictFormatter> {
        match self {
            Self::Text => Box::new(TextFormatter),
            Self::Json => Box::new(JsonFormatter),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Renders a [`ScanVerdict`] for display.
pub trait VerdictFormatter: Send + Sync {
    /// Writes the rendered verdict to `out`.
    fn write_verdict(&self, verdict: &ScanVerdict, out: &mut dyn Write) -> io::Result<()>;

    /// Renders the verdict into a string.
    fn render(&self, verdict: &ScanVerdict) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_verdict(verdict, &mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Plain-text layout: a header, then one block per engine.
///
/// ```text
/// Filename: invoice.pdf
/// OverallStatus: No Threat Detected
/// Engine: EngineX
/// Threat Found: Clean
/// Scan Result: 0
/// DefTime: 2024-03-01T06:12:00.000Z
///
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl VerdictFormatter for TextFormatter {
    fn write_verdict(&self, verdict: &ScanVerdict, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Filename: {}", verdict.filename)?;
        writeln!(out, "OverallStatus: {}", verdict.overall_result)?;

        for (engine, result) in &verdict.engines {
            writeln!(out, "Engine: {engine}")?;
            writeln!(out, "Threat Found: {}", result.threat_label())?;
            writeln!(out, "Scan Result: {}", result.scan_result)?;
            writeln!(out, "DefTime: {}", result.def_time.as_deref().unwrap_or(""))?;
            writeln!(out)?;
        }
        Ok(())
    }
}

/// JSON layout with normalized threat labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl VerdictFormatter for JsonFormatter {
    fn write_verdict(&self, verdict: &ScanVerdict, out: &mut dyn Write) -> io::Result<()> {
        let engines: serde_json::Map<String, serde_json::Value> = verdict
            .engines
            .iter()
            .map(|(engine, result)| {
                (
                    engine.clone(),
                    json!({
                        "threat_found": result.threat_label(),
                        "scan_result": result.scan_result,
                        "def_time": result.def_time,
                    }),
                )
            })
            .collect();

        let document = json!({
            "filename": verdict.filename,
            "overall_result": verdict.overall_result,
            "detections": verdict.detection_count(),
            "engines": engines,
        });

        serde_json::to_writer_pretty(&mut *out, &document)?;
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineResult;

    fn verdict() -> ScanVerdict {
        ScanVerdict::new("abc123.bin", "No Threat Detected")
            .with_engine(
                "EngineX",
                EngineResult::new(Some(String::new()), 0).with_def_time("2024-03-01T06:12:00.000Z"),
            )
            .with_engine("EngineY", EngineResult::new(Some("EICAR-Test-File".into()), 1))
    }

    #[test]
    fn test_text_renders_empty_label_as_clean() {
        let text = TextFormatter.render(&verdict());
        assert!(text.contains("Engine: EngineX\nThreat Found: Clean\nScan Result: 0\n"));
        assert!(!text.contains("Threat Found: \n"));
    }

    #[test]
    fn test_text_layout() {
        let text = TextFormatter.render(&verdict());
        let expected = [
            "Filename: abc123.bin",
            "OverallStatus: No Threat Detected",
            "Engine: EngineX",
            "Threat Found: Clean",
            "Scan Result: 0",
            "DefTime: 2024-03-01T06:12:00.000Z",
            "",
            "Engine: EngineY",
            "Threat Found: EICAR-Test-File",
            "Scan Result: 1",
            "DefTime: ",
            "",
        ];
        assert_eq!(text.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_json_normalizes_labels() {
        let rendered = JsonFormatter.render(&verdict());
        let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(json["engines"]["EngineX"]["threat_found"], "Clean");
        assert_eq!(json["engines"]["EngineY"]["threat_found"], "EICAR-Test-File");
        assert_eq!(json["detections"], 1);
        assert!(json["engines"]["EngineY"]["def_time"].is_null());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
