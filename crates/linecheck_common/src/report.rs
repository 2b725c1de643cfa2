//! Diagnostic report model and rendering.
//!
//! A report is eight fixed sections in a fixed order. Each section either
//! carries real content or is [`SectionValue::Unavailable`]; rendering
//! substitutes the literal `unknown` sentinel for unavailable sections, so
//! a run where every subsystem is unreachable still produces a complete
//! report. A rendered report is never mutated; every run builds a new one.

use crate::timefmt;
use chrono::{DateTime, Local};

/// Sentinel rendered for a section whose data source failed or was empty.
pub const UNKNOWN: &str = "unknown";

/// Content of one report section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionValue {
    Present(String),
    Unavailable,
}

impl SectionValue {
    /// Wraps collected text; empty or whitespace-only text counts as
    /// unavailable.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            Self::Unavailable
        } else {
            Self::Present(text)
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    fn content(&self) -> &str {
        match self {
            Self::Present(text) => text,
            Self::Unavailable => UNKNOWN,
        }
    }
}

impl<T: Into<String>> From<Option<T>> for SectionValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(text) => Self::from_text(text),
            None => Self::Unavailable,
        }
    }
}

/// The eight section values of one diagnostic run, in report order.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub optical: SectionValue,
    pub detector: SectionValue,
    pub ejector: SectionValue,
    pub belt_speed: SectionValue,
    pub blank_noise: SectionValue,
    pub sorting_program: SectionValue,
    pub data_collection: SectionValue,
    pub artifact_freshness: SectionValue,
}

impl ReportInputs {
    /// All sections unavailable; collection fills in what it can.
    pub fn empty() -> Self {
        Self {
            optical: SectionValue::Unavailable,
            detector: SectionValue::Unavailable,
            ejector: SectionValue::Unavailable,
            belt_speed: SectionValue::Unavailable,
            blank_noise: SectionValue::Unavailable,
            sorting_program: SectionValue::Unavailable,
            data_collection: SectionValue::Unavailable,
            artifact_freshness: SectionValue::Unavailable,
        }
    }
}

/// Report filename with the embedded generation stamp, e.g.
/// `checkReport_2026-08-05-14-03-27.txt`. Uniqueness across runs relies
/// on the stamp's 1-second resolution.
pub fn file_name(generated_at: &DateTime<Local>) -> String {
    format!("checkReport_{}.txt", timefmt::file_stamp(generated_at))
}

/// Renders the plain-text report body.
///
/// Section order and the blank line between sections are part of the
/// format consumed downstream. Multi-line bodies (belt speed, freshness)
/// start on the line after their header; an unavailable multi-line
/// section collapses to the inline sentinel form.
pub fn render(inputs: &ReportInputs) -> String {
    let sections = [
        inline("Optical unit", &inputs.optical),
        inline("Detector", &inputs.detector),
        inline("Ejector", &inputs.ejector),
        block("Belt speed", &inputs.belt_speed),
        inline("Blank noise", &inputs.blank_noise),
        inline("Sorting program", &inputs.sorting_program),
        inline("Data collection", &inputs.data_collection),
        block("Program/model freshness", &inputs.artifact_freshness),
    ];
    let mut body = sections.join("\n\n");
    body.push('\n');
    body
}

fn inline(label: &str, value: &SectionValue) -> String {
    format!(">>{}: {}", label, value.content())
}

fn block(label: &str, value: &SectionValue) -> String {
    match value {
        SectionValue::Present(content) => format!(">>{}:\n{}", label, content),
        SectionValue::Unavailable => inline(label, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_text_is_unavailable() {
        assert_eq!(SectionValue::from_text(""), SectionValue::Unavailable);
        assert_eq!(SectionValue::from_text("  \n"), SectionValue::Unavailable);
        assert!(SectionValue::from_text("ok").is_available());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SectionValue::from(None::<String>), SectionValue::Unavailable);
        assert_eq!(
            SectionValue::from(Some("running")),
            SectionValue::Present("running".to_string())
        );
    }

    #[test]
    fn test_file_name_embeds_stamp() {
        let dt = Local.with_ymd_and_hms(2026, 8, 5, 9, 30, 5).unwrap();
        assert_eq!(file_name(&dt), "checkReport_2026-08-05-09-30-05.txt");
    }

    #[test]
    fn test_all_unavailable_renders_eight_unknown_sections() {
        let body = render(&ReportInputs::empty());
        assert_eq!(body.matches(">>").count(), 8);
        assert_eq!(body.matches(UNKNOWN).count(), 8);
        assert_eq!(
            body,
            ">>Optical unit: unknown\n\n\
             >>Detector: unknown\n\n\
             >>Ejector: unknown\n\n\
             >>Belt speed: unknown\n\n\
             >>Blank noise: unknown\n\n\
             >>Sorting program: unknown\n\n\
             >>Data collection: unknown\n\n\
             >>Program/model freshness: unknown\n"
        );
    }

    #[test]
    fn test_block_section_starts_on_next_line() {
        let mut inputs = ReportInputs::empty();
        inputs.belt_speed = SectionValue::Present(
            "\tspeed feedback: [1.00,1.00,1.00,1.00,1.00]\n\tfrequency feedback: [2.00,2.00,2.00,2.00,2.00]\n\tfrequency setpoint: [3.00,3.00,3.00,3.00,3.00]".to_string(),
        );
        let body = render(&inputs);
        assert!(body.contains(">>Belt speed:\n\tspeed feedback: [1.00,"));
        // Still blank-line separated from the next section.
        assert!(body.contains("[3.00,3.00,3.00,3.00,3.00]\n\n>>Blank noise: unknown"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let mut inputs = ReportInputs::empty();
        inputs.detector = SectionValue::Present("online".to_string());
        assert_eq!(render(&inputs), render(&inputs));
    }
}
