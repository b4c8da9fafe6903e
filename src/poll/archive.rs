//! Archive of the final tally, posted to the dump channel before a reset.

use crate::config::RESULTS_MARKER;
use crate::platform::resilient::send_long_message;
use crate::platform::{ChannelId, ChatPlatform};
use crate::poll::attendance::AttendanceTable;
use crate::render::layout::TableLayout;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One attendee's final votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedVote {
    pub user_id: u64,
    pub user_name: String,
    /// Emoji identities: the unicode sequence or `name:id`
    pub votes: Vec<String>,
}

/// Final tally of one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedResult {
    pub date: NaiveDate,
    pub votes: Vec<ArchivedVote>,
}

impl ArchivedResult {
    /// Snapshot `table`, users in the same order as the rendered table columns
    #[must_use]
    pub fn from_table(table: &AttendanceTable, date: NaiveDate) -> Self {
        let layout = TableLayout::from_table(table);
        let votes = layout
            .columns
            .iter()
            .map(|attendee| ArchivedVote {
                user_id: attendee.profile.id.0,
                user_name: attendee.profile.name.clone(),
                votes: attendee.votes.iter().map(|e| e.identity()).collect(),
            })
            .collect();
        Self { date, votes }
    }

    /// Fenced pretty JSON; the results marker is added per message on send
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_block(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string_pretty(self)?;
        Ok(format!("```json\n{json}\n```"))
    }
}

/// Posts archived results to the dump channel
pub struct ResultsArchiver {
    platform: Arc<dyn ChatPlatform>,
    channel: ChannelId,
}

impl ResultsArchiver {
    #[must_use]
    pub fn new(platform: Arc<dyn ChatPlatform>, channel: ChannelId) -> Self {
        Self { platform, channel }
    }

    /// Post the tally of `table` for the poll ending on `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be serialized or sent.
    pub async fn archive(
        &self,
        table: &AttendanceTable,
        date: NaiveDate,
    ) -> anyhow::Result<ArchivedResult> {
        let result = ArchivedResult::from_table(table, date);
        let text = result.to_json_block()?;
        let sent =
            send_long_message(self.platform.as_ref(), self.channel, RESULTS_MARKER, &text).await?;
        info!(
            "Archived results for {} ({} attendees) in {} message(s)",
            date,
            result.votes.len(),
            sent.len()
        );
        Ok(result)
    }
}
