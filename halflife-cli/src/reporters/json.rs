//! JSON report: the machine-readable format. Round-trips losslessly, so
//! `combine` consumes files produced here.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::burndown::BurndownResult;

pub fn write(result: &BurndownResult, writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, result).context("failed to encode the result")?;
    writeln!(writer)?;
    Ok(())
}

pub fn read(path: &Path) -> Result<BurndownResult> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open result file {:?}", path))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse result file {:?}", path))
}
