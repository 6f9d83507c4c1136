//! Report output formats
//!
//! `text` renders the YAML-like report meant for human eyes and the plot
//! tooling; `json` is the machine format that also feeds `combine`.

pub mod json;
pub mod text;

use anyhow::Result;
use std::io::Write;

use crate::burndown::BurndownResult;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_name(name: &str) -> Option<ReportFormat> {
        match name {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

pub fn write_report(
    result: &BurndownResult,
    format: ReportFormat,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        ReportFormat::Text => text::write(result, writer),
        ReportFormat::Json => json::write(result, writer),
    }
}
