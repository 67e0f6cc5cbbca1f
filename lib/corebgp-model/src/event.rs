//! Announcement watch events

use crate::{Announcement, ModelError, Result, UpdateType};
use serde::Deserialize;

/// One change notification from the announcement watch stream.
///
/// A deletion carries the last stored state of the announcement, which may be
/// empty when the store kept no previous value.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub enum WatchEvent {
    Added(Announcement),
    Updated(Announcement),
    Deleted(Announcement),
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: UpdateType,
    #[serde(alias = "data", default)]
    announcement: Option<Announcement>,
}

impl TryFrom<RawEvent> for WatchEvent {
    type Error = ModelError;

    fn try_from(raw: RawEvent) -> Result<Self> {
        match (raw.kind, raw.announcement) {
            (UpdateType::Added, Some(a)) => Ok(WatchEvent::Added(a)),
            (UpdateType::Updated, Some(a)) => Ok(WatchEvent::Updated(a)),
            (UpdateType::Deleted, a) => Ok(WatchEvent::Deleted(a.unwrap_or_default())),
            (UpdateType::Added, None) => Err(ModelError::EmptyEvent("added")),
            (UpdateType::Updated, None) => Err(ModelError::EmptyEvent("updated")),
        }
    }
}

impl WatchEvent {
    /// Decode one text frame of the watch stream
    pub fn decode(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn kind(&self) -> UpdateType {
        match self {
            WatchEvent::Added(_) => UpdateType::Added,
            WatchEvent::Updated(_) => UpdateType::Updated,
            WatchEvent::Deleted(_) => UpdateType::Deleted,
        }
    }

    pub fn announcement(&self) -> &Announcement {
        match self {
            WatchEvent::Added(a) | WatchEvent::Updated(a) | WatchEvent::Deleted(a) => a,
        }
    }
}
