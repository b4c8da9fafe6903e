//! Poll message templates
//!
//! The template document is a YAML file holding scheduled bodies (used once,
//! in the week their date falls in), a pool of random bodies (each used once)
//! and a default body used when both are exhausted.

use crate::poll::schedule::{parse_when, resolve_relative};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Body used when the template document cannot be read
pub const FALLBACK_BODY: &str = "Who's coming to games night this week?";

/// Errors from loading or saving the template document
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Reading or writing the file failed
    #[error("Failed to access template file {path}: {source}")]
    Io {
        /// Template file path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },
    /// The file is not a valid template document
    #[error("Invalid template YAML in {path}: {source}")]
    Yaml {
        /// Template file path
        path: PathBuf,
        /// YAML error
        source: serde_yaml::Error,
    },
}

/// A body reserved for a particular date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    /// Date expression, absolute or relative
    pub when: String,
    /// Message body
    pub message: String,
}

/// The whole template file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(default)]
    pub scheduled_messages: Vec<ScheduledMessage>,
    #[serde(default)]
    pub random_messages: Vec<String>,
    pub default_message: String,
}

/// Which pool a body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickSource {
    Scheduled,
    Random,
    Default,
}

/// Result of picking a body: the body and the document without it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick {
    pub body: String,
    pub document: TemplateDocument,
    pub source: PickSource,
}

impl TemplateDocument {
    /// Choose the body for the poll covering (`last`, `next`).
    ///
    /// The first scheduled entry dated strictly inside the window wins;
    /// otherwise a random entry; otherwise the default. The chosen scheduled
    /// or random entry is absent from the returned document. Relative `when`
    /// expressions are anchored to `now`.
    #[must_use]
    pub fn pick_body_for<R: Rng + ?Sized>(
        &self,
        last: NaiveDateTime,
        next: NaiveDateTime,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> Pick {
        let mut document = self.clone();

        let scheduled = self.scheduled_messages.iter().position(|entry| {
            match parse_when(&entry.when).or_else(|| resolve_relative(&entry.when, now)) {
                Some(when) => {
                    debug!("Scheduled message dated {} (window {} .. {})", when, last, next);
                    last < when && when < next
                }
                None => {
                    warn!("Could not parse scheduled message date {:?}", entry.when);
                    false
                }
            }
        });

        if let Some(index) = scheduled {
            let entry = document.scheduled_messages.remove(index);
            return Pick {
                body: entry.message,
                document,
                source: PickSource::Scheduled,
            };
        }

        if !document.random_messages.is_empty() {
            let index = rng.gen_range(0..document.random_messages.len());
            let body = document.random_messages.remove(index);
            return Pick {
                body,
                document,
                source: PickSource::Random,
            };
        }

        Pick {
            body: document.default_message.clone(),
            document,
            source: PickSource::Default,
        }
    }
}

/// Persistent storage of the template document
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Read the current document
    async fn load(&self) -> Result<TemplateDocument, TemplateError>;
    /// Replace the stored document
    async fn save(&self, document: &TemplateDocument) -> Result<(), TemplateError>;
}

/// Template document kept in a YAML file
#[derive(Debug, Clone)]
pub struct YamlTemplateStore {
    path: PathBuf,
}

impl YamlTemplateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TemplateStore for YamlTemplateStore {
    async fn load(&self) -> Result<TemplateDocument, TemplateError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| TemplateError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        serde_yaml::from_str(&content).map_err(|source| TemplateError::Yaml {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, document: &TemplateDocument) -> Result<(), TemplateError> {
        let content = serde_yaml::to_string(document).map_err(|source| TemplateError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| TemplateError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid test date")
    }

    fn document() -> TemplateDocument {
        TemplateDocument {
            scheduled_messages: vec![
                ScheduledMessage {
                    when: "2026-12-24".into(),
                    message: "Christmas special!".into(),
                },
                ScheduledMessage {
                    when: "soonish".into(),
                    message: "Never picked".into(),
                },
            ],
            random_messages: vec!["One".into(), "Two".into(), "Three".into()],
            default_message: "Games?".into(),
        }
    }

    #[test]
    fn test_scheduled_entry_used_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let (last, next) = (at(2026, 12, 17), at(2026, 12, 31));

        let first = document().pick_body_for(last, next, last, &mut rng);
        assert_eq!(first.source, PickSource::Scheduled);
        assert_eq!(first.body, "Christmas special!");
        // Unparseable entries stay in the document
        assert_eq!(first.document.scheduled_messages.len(), 1);

        let second = first.document.pick_body_for(last, next, last, &mut rng);
        assert_eq!(second.source, PickSource::Random);
        assert_ne!(second.body, "Christmas special!");
    }

    #[test]
    fn test_scheduled_window_is_exclusive() {
        let mut rng = StdRng::seed_from_u64(7);
        let christmas = NaiveDate::from_ymd_opt(2026, 12, 24)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        let pick = document().pick_body_for(christmas, at(2026, 12, 31), christmas, &mut rng);
        assert_eq!(pick.source, PickSource::Random);
    }

    #[test]
    fn test_relative_when_anchored_to_now() {
        let mut rng = StdRng::seed_from_u64(1);
        let doc = TemplateDocument {
            scheduled_messages: vec![ScheduledMessage {
                when: "tomorrow".into(),
                message: "Tomorrow's special".into(),
            }],
            random_messages: Vec::new(),
            default_message: "Games?".into(),
        };
        let now = at(2026, 10, 16);
        let pick = doc.pick_body_for(at(2026, 10, 15), at(2026, 10, 22), now, &mut rng);
        assert_eq!(pick.source, PickSource::Scheduled);
    }

    #[test]
    fn test_random_pool_drains_then_default_remains() {
        let mut rng = StdRng::seed_from_u64(42);
        let (last, next) = (at(2026, 1, 1), at(2026, 1, 8));
        let mut doc = document();
        let mut seen = Vec::new();

        for _ in 0..3 {
            let pick = doc.pick_body_for(last, next, last, &mut rng);
            assert_eq!(pick.source, PickSource::Random);
            seen.push(pick.body);
            doc = pick.document;
        }
        seen.sort();
        assert_eq!(seen, vec!["One", "Three", "Two"]);

        for _ in 0..2 {
            let pick = doc.pick_body_for(last, next, last, &mut rng);
            assert_eq!(pick.source, PickSource::Default);
            assert_eq!(pick.body, "Games?");
            assert_eq!(pick.document.default_message, "Games?");
            doc = pick.document;
        }
    }

    #[test]
    fn test_random_covers_last_index() {
        let (last, next) = (at(2026, 1, 1), at(2026, 1, 8));
        let doc = TemplateDocument {
            scheduled_messages: Vec::new(),
            random_messages: vec!["a".into(), "b".into()],
            default_message: "d".into(),
        };
        let mut hits = std::collections::HashSet::new();
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            hits.insert(doc.pick_body_for(last, next, last, &mut rng).body);
        }
        assert!(hits.contains("a") && hits.contains("b"));
    }

    #[tokio::test]
    async fn test_yaml_store_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("poll_messages.yaml");
        tokio::fs::write(
            &path,
            "scheduled_messages:\n  - when: 24 December 2026\n    message: Christmas special!\nrandom_messages:\n  - One\ndefault_message: Games?\n",
        )
        .await
        .expect("write fixture");

        let store = YamlTemplateStore::new(&path);
        let loaded = store.load().await.expect("load");
        assert_eq!(loaded.scheduled_messages[0].when, "24 December 2026");
        assert_eq!(loaded.random_messages, vec!["One"]);

        store.save(&loaded).await.expect("save");
        assert_eq!(store.load().await.expect("reload"), loaded);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = YamlTemplateStore::new("/nonexistent/poll_messages.yaml");
        assert!(matches!(store.load().await, Err(TemplateError::Io { .. })));
    }
}
