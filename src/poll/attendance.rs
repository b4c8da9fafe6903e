//! Attendance table derived from the poll message's reactions.

use crate::config::{THUMB_DOWN, THUMB_UP};
use crate::platform::{ChatPlatform, EmojiKey, PlatformError, PlatformMessage, UserId, UserProfile};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// One attendee and the games they voted for, in reaction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    /// Who
    pub profile: UserProfile,
    /// Game reactions placed by this user
    pub votes: Vec<EmojiKey>,
}

/// Mapping from attendee to the game reactions they placed.
///
/// Only users who reacted with the attendance emoji are keys. Game votes from
/// anyone else are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceTable {
    entries: BTreeMap<UserId, Attendee>,
    emoji_urls: HashMap<EmojiKey, String>,
}

impl AttendanceTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the given attendees and no votes
    #[must_use]
    pub fn from_attendees(attendees: impl IntoIterator<Item = UserProfile>) -> Self {
        let mut table = Self::new();
        for profile in attendees {
            table.add_attendee(profile);
        }
        table
    }

    /// Add an attendee; an existing entry keeps its votes
    pub fn add_attendee(&mut self, profile: UserProfile) {
        self.entries.entry(profile.id).or_insert(Attendee {
            profile,
            votes: Vec::new(),
        });
    }

    /// Record a game vote. Returns `false` when the user is not an attendee.
    pub fn add_vote(&mut self, user: UserId, emoji: &EmojiKey) -> bool {
        let Some(attendee) = self.entries.get_mut(&user) else {
            return false;
        };
        if !attendee.votes.contains(emoji) {
            attendee.votes.push(emoji.clone());
        }
        true
    }

    /// Remember where a custom emoji's art lives
    pub fn set_emoji_url(&mut self, emoji: EmojiKey, url: String) {
        self.emoji_urls.insert(emoji, url);
    }

    /// Art URL recorded for a custom emoji
    #[must_use]
    pub fn emoji_url(&self, emoji: &EmojiKey) -> Option<&str> {
        self.emoji_urls.get(emoji).map(String::as_str)
    }

    /// Attendee entry for a user
    #[must_use]
    pub fn get(&self, user: UserId) -> Option<&Attendee> {
        self.entries.get(&user)
    }

    /// Whether `user` voted for `emoji`
    #[must_use]
    pub fn voted(&self, user: UserId, emoji: &EmojiKey) -> bool {
        self.entries
            .get(&user)
            .is_some_and(|a| a.votes.contains(emoji))
    }

    /// Attendees ordered by user id
    pub fn iter(&self) -> impl Iterator<Item = &Attendee> {
        self.entries.values()
    }

    /// Distinct games voted for by at least one attendee
    #[must_use]
    pub fn games(&self) -> BTreeSet<EmojiKey> {
        self.entries
            .values()
            .flat_map(|a| a.votes.iter().cloned())
            .collect()
    }

    /// Number of attendees who voted for `emoji`
    #[must_use]
    pub fn voter_count(&self, emoji: &EmojiKey) -> usize {
        self.entries
            .values()
            .filter(|a| a.votes.contains(emoji))
            .count()
    }

    /// Number of attendees
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is attending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a reaction counts as a game vote
#[must_use]
pub fn is_game_reaction(emoji: &EmojiKey) -> bool {
    !emoji.is_unicode(THUMB_UP) && !emoji.is_unicode(THUMB_DOWN)
}

/// Build the attendance table for a poll message from its live reactions.
///
/// # Errors
///
/// Returns an error if the reacting users cannot be fetched.
pub async fn collect_attendance(
    platform: &dyn ChatPlatform,
    message: &PlatformMessage,
) -> Result<AttendanceTable, PlatformError> {
    let thumb_up = EmojiKey::Unicode(THUMB_UP.to_string());

    let attendees = if message.reactions.contains(&thumb_up) {
        platform
            .reaction_users(message.channel_id, message.id, &thumb_up)
            .await?
    } else {
        Vec::new()
    };

    let mut table = AttendanceTable::from_attendees(attendees);
    let games: Vec<&EmojiKey> = message
        .reactions
        .iter()
        .filter(|e| is_game_reaction(e))
        .collect();

    info!(
        "Found {} attendees, who want to play {} games",
        table.len(),
        games.len()
    );

    for emoji in games {
        if let Some(url) = platform.custom_emoji_url(emoji) {
            table.set_emoji_url(emoji.clone(), url);
        }
        let voters = platform
            .reaction_users(message.channel_id, message.id, emoji)
            .await?;
        for voter in voters {
            if !table.add_vote(voter.id, emoji) {
                debug!(
                    "Ignoring {} vote from {} who has not reacted {}",
                    emoji, voter.name, THUMB_UP
                );
            }
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelId, MessageId, MockChatPlatform};
    use crate::testing::{custom_emoji, profile};
    use chrono::Utc;

    #[test]
    fn test_attendee_without_votes_is_kept() {
        let mut table = AttendanceTable::from_attendees([profile(1, "Alice"), profile(2, "Bob")]);
        let chess = custom_emoji(10, "chess");
        assert!(table.add_vote(UserId(1), &chess));

        assert_eq!(table.len(), 2);
        assert!(table.get(UserId(2)).is_some_and(|a| a.votes.is_empty()));
        assert_eq!(table.voter_count(&chess), 1);
    }

    #[test]
    fn test_votes_without_attendance_are_dropped() {
        let mut table = AttendanceTable::from_attendees([profile(1, "Alice")]);
        let go = custom_emoji(11, "go");
        assert!(!table.add_vote(UserId(3), &go));
        assert!(table.get(UserId(3)).is_none());
        assert!(table.games().is_empty());
    }

    #[test]
    fn test_duplicate_vote_recorded_once() {
        let mut table = AttendanceTable::from_attendees([profile(1, "Alice")]);
        let go = custom_emoji(11, "go");
        table.add_vote(UserId(1), &go);
        table.add_vote(UserId(1), &go);
        assert_eq!(table.get(UserId(1)).map(|a| a.votes.len()), Some(1));
    }

    #[tokio::test]
    async fn test_collect_attendance_excludes_thumbs() {
        let thumb_up = EmojiKey::Unicode(THUMB_UP.to_string());
        let thumb_down = EmojiKey::Unicode(THUMB_DOWN.to_string());
        let chess = custom_emoji(10, "chess");
        let message = PlatformMessage {
            id: MessageId(5),
            channel_id: ChannelId(1),
            created_at: Utc::now(),
            content: "{poll} @everyone".into(),
            is_system: false,
            reactions: vec![thumb_up.clone(), thumb_down.clone(), chess.clone()],
            attachment_urls: Vec::new(),
        };

        let mut mock = MockChatPlatform::new();
        mock.expect_reaction_users()
            .returning(move |_, _, emoji| match emoji {
                EmojiKey::Unicode(s) if s == THUMB_UP => {
                    Ok(vec![profile(1, "Alice"), profile(2, "Bob")])
                }
                EmojiKey::Custom { name, .. } if name == "chess" => {
                    Ok(vec![profile(1, "Alice"), profile(3, "Carol")])
                }
                other => panic!("unexpected reaction lookup for {other}"),
            });
        mock.expect_custom_emoji_url()
            .returning(|e| Some(format!("https://cdn.test/{}.png", e.identity())));

        let table = collect_attendance(&mock, &message)
            .await
            .expect("collect should succeed");

        assert_eq!(table.len(), 2);
        assert!(table.voted(UserId(1), &chess));
        assert!(!table.voted(UserId(2), &chess));
        assert!(table.get(UserId(3)).is_none());
        assert!(!table.games().contains(&thumb_down));
        assert_eq!(
            table.emoji_url(&chess),
            Some("https://cdn.test/chess:10.png")
        );
    }
}
