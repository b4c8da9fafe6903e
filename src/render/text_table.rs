//! Boxed plain-text rendering of the attendance grid.

use super::layout::TableLayout;

#[derive(Clone, Copy)]
enum Align {
    Right,
    Center,
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.chars().count());
    let (left, right) = match align {
        Align::Right => (fill, 0),
        Align::Center => (fill / 2, fill - fill / 2),
    };
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

fn separator(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.push_str(&fill.to_string().repeat(width + 2));
        line.push('+');
    }
    line
}

fn row_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let align = if i == 0 { Align::Right } else { Align::Center };
        line.push(' ');
        line.push_str(&pad(cell, *width, align));
        line.push_str(" |");
    }
    line
}

/// Draw `layout` as a text grid.
///
/// The first column holds right-aligned game labels, the header row holds
/// attendee names, and `check` marks each vote.
#[must_use]
pub fn draw(layout: &TableLayout, check: &str) -> String {
    let mut grid: Vec<Vec<String>> = Vec::with_capacity(layout.rows.len() + 1);

    let mut header = vec![String::new()];
    header.extend(layout.columns.iter().map(|a| a.profile.name.clone()));
    grid.push(header);

    for (row, game) in layout.rows.iter().enumerate() {
        let mut cells = vec![game.label()];
        cells.extend((0..layout.columns.len()).map(|col| {
            if layout.is_marked(col, row) {
                check.to_string()
            } else {
                String::new()
            }
        }));
        grid.push(cells);
    }

    let mut widths = vec![0; layout.columns.len() + 1];
    for cells in &grid {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = separator(&widths, '-');
    let mut lines = vec![border.clone()];
    for (i, cells) in grid.iter().enumerate() {
        lines.push(row_line(cells, &widths));
        lines.push(if i == 0 {
            separator(&widths, '=')
        } else {
            border.clone()
        });
    }
    lines.join("\n")
}
