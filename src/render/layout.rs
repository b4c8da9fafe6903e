//! Column and row ordering shared by the image and text tables.

use crate::platform::EmojiKey;
use crate::poll::attendance::{Attendee, AttendanceTable};
use std::cmp::Reverse;

/// Ordered grid derived from an attendance table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    /// One column per attendee: fewest votes first, non-voters last
    pub columns: Vec<Attendee>,
    /// One row per game: most voters first
    pub rows: Vec<EmojiKey>,
}

impl TableLayout {
    /// Order `table` for display.
    ///
    /// Column ties break on display name then user id. Row ties break on the
    /// emoji identity string.
    #[must_use]
    pub fn from_table(table: &AttendanceTable) -> Self {
        let mut columns: Vec<Attendee> = table.iter().cloned().collect();
        columns.sort_by(|a, b| {
            (a.votes.is_empty(), a.votes.len(), &a.profile.name, a.profile.id).cmp(&(
                b.votes.is_empty(),
                b.votes.len(),
                &b.profile.name,
                b.profile.id,
            ))
        });

        let mut rows: Vec<(usize, String, EmojiKey)> = table
            .games()
            .into_iter()
            .map(|game| (table.voter_count(&game), game.identity(), game))
            .collect();
        rows.sort_by(|a, b| (Reverse(a.0), &a.1).cmp(&(Reverse(b.0), &b.1)));

        Self {
            columns,
            rows: rows.into_iter().map(|(_, _, game)| game).collect(),
        }
    }

    /// Whether the attendee in `column` voted for the game in `row`
    #[must_use]
    pub fn is_marked(&self, column: usize, row: usize) -> bool {
        match (self.columns.get(column), self.rows.get(row)) {
            (Some(attendee), Some(game)) => attendee.votes.contains(game),
            _ => false,
        }
    }

    /// Whether there is nothing to draw
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
