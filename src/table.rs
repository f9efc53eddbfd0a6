//! Plain-text grid rendering for frames and field lists, plus delimited export.

use std::{borrow::Cow, fmt::Write as _, io};

use anyhow::Result;
use csv::QuoteStyle;

use crate::{
    data::Value,
    frame::{DataFrame, Field},
};

const COLUMN_GAP: &str = "  ";
const NULL_MARKER: &str = "";

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

pub fn render_frame(frame: &DataFrame) -> String {
    let names = frame.column_names();
    let mut aligns = vec![Align::Left; names.len()];
    let cells = frame
        .rows
        .iter()
        .map(|row| {
            names
                .iter()
                .enumerate()
                .map(|(idx, name)| match row.get(name) {
                    Some(number @ Value::Number(_)) => {
                        aligns[idx] = Align::Right;
                        number.as_display()
                    }
                    Some(Value::Null) | None => NULL_MARKER.to_string(),
                    Some(other) => other.as_display(),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    render_grid(&names, &cells, &aligns)
}

pub fn render_fields(fields: &[Field], primary_key: Option<&str>) -> String {
    let headers = ["#", "name", "type", "source", "key"].map(String::from);
    let rows = fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            vec![
                (idx + 1).to_string(),
                field.name.clone(),
                field.column_type.to_string(),
                field
                    .column_name
                    .clone()
                    .unwrap_or_else(|| "(computed)".to_string()),
                if primary_key == Some(field.name.as_str()) {
                    "*".to_string()
                } else {
                    String::new()
                },
            ]
        })
        .collect::<Vec<_>>();
    let mut aligns = vec![Align::Left; headers.len()];
    aligns[0] = Align::Right;
    render_grid(&headers, &rows, &aligns)
}

fn render_grid(headers: &[String], rows: &[Vec<String>], aligns: &[Align]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| display_width(h).max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(&sanitize_cell(cell)));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths, aligns));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rule, &widths, aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths, aligns));
    }
    output
}

fn format_line(cells: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .zip(aligns)
        .map(|((cell, width), align)| {
            let cell = sanitize_cell(cell);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            match align {
                Align::Left => format!("{cell}{padding}"),
                Align::Right => format!("{padding}{cell}"),
            }
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

/// Control characters would break the grid.
fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.chars().any(char::is_control) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if ch.is_control() { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}

/// Writes the frame's columns and rows as delimited text, every field quoted.
/// Nulls become empty fields.
pub fn write_csv<W: io::Write>(frame: &DataFrame, writer: W, delimiter: u8) -> Result<()> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    let mut writer = builder.from_writer(writer);
    let names = frame.column_names();
    writer.write_record(&names)?;
    for row in &frame.rows {
        writer.write_record(
            names
                .iter()
                .map(|name| row.get(name).map(Value::as_display).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}
