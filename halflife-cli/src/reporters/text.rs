//! YAML-like text report
//!
//! Matrices print as literal blocks with right-aligned, uniformly padded
//! cells; rows are padded to the widest row so downstream plotters can
//! read the block as a rectangle.

use anyhow::Result;
use std::io::Write;

use crate::burndown::BurndownResult;

pub fn write(result: &BurndownResult, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "burndown:")?;
    writeln!(writer, "  granularity: {}", result.granularity)?;
    writeln!(writer, "  sampling: {}", result.sampling)?;
    print_matrix(writer, &result.global_history, 2, "project")?;

    if !result.file_histories.is_empty() {
        writeln!(writer, "  files:")?;
        for (path, history) in &result.file_histories {
            print_matrix(writer, history, 4, path)?;
        }
    }

    if !result.people.is_empty() {
        writeln!(writer, "  people_sequence:")?;
        for name in &result.people {
            writeln!(writer, "    - {}", safe_string(name))?;
        }
        writeln!(writer, "  people:")?;
        for (id, history) in result.people_histories.iter().enumerate() {
            print_matrix(writer, history, 4, &result.people[id])?;
        }
        if !result.people_matrix.is_empty() {
            writeln!(writer, "  people_interaction: |-")?;
            print_rows(writer, &result.people_matrix, 4)?;
        }
    }
    Ok(())
}

fn print_matrix(
    writer: &mut dyn Write,
    matrix: &[Vec<i64>],
    indent: usize,
    name: &str,
) -> Result<()> {
    writeln!(
        writer,
        "{}{}: |-",
        " ".repeat(indent),
        safe_string(name)
    )?;
    print_rows(writer, matrix, indent)
}

fn print_rows(writer: &mut dyn Write, matrix: &[Vec<i64>], indent: usize) -> Result<()> {
    let columns = matrix.iter().map(|row| row.len()).max().unwrap_or(0);
    let width = matrix
        .iter()
        .flatten()
        .map(|value| value.to_string().len())
        .max()
        .unwrap_or(1);
    let pad = " ".repeat(indent + 2);
    for row in matrix {
        let mut line = String::new();
        for column in 0..columns {
            if column > 0 {
                line.push(' ');
            }
            let value = row.get(column).copied().unwrap_or(0);
            line.push_str(&format!("{:>width$}", value, width = width));
        }
        writeln!(writer, "{}{}", pad, line)?;
    }
    Ok(())
}

/// Quotes strings YAML would misread as something other than a scalar.
fn safe_string(s: &str) -> String {
    if s.is_empty()
        || s.contains(|c: char| matches!(c, ':' | '#' | '"' | '\''))
        || s.starts_with(|c: char| c.is_whitespace() || matches!(c, '-' | '@' | '{' | '['))
        || s.ends_with(|c: char| c.is_whitespace())
    {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}
