//! Classification of the incremental update feed.
//!
//! The feed is an ordered list of loosely typed entries. Each one is either
//! turned into part of a structured [`Updates`] diff or counted in a
//! [`RejectionTally`]; a malformed entry never aborts the rest of the batch.

use serde_json::Value;
use tracing::debug;

use crate::normalize::{build_area, build_circle, build_line, build_marker, build_marker_set_info};
use crate::raw::RawRecord;
use crate::{
    ChatEvent, ChatMessage, ChatSource, RejectionTally, TileUpdate, UpdateOp, UpdateRejection,
    Updates,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Component,
    Chat,
    PlayerJoin,
    PlayerQuit,
    Tile,
}

impl EntryKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "component" => Some(EntryKind::Component),
            "chat" => Some(EntryKind::Chat),
            "playerjoin" => Some(EntryKind::PlayerJoin),
            "playerquit" => Some(EntryKind::PlayerQuit),
            "tile" => Some(EntryKind::Tile),
            _ => None,
        }
    }
}

/// Target of a `component` entry, taken from the prefix of its `msg` field
/// (`setupdated`, `markerdeleted`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentMessage {
    Set,
    Marker,
    Area,
    Circle,
    Line,
    Other,
}

impl ComponentMessage {
    pub fn from_msg(msg: &str) -> Self {
        if msg.starts_with("set") {
            ComponentMessage::Set
        } else if msg.starts_with("marker") {
            ComponentMessage::Marker
        } else if msg.starts_with("area") {
            ComponentMessage::Area
        } else if msg.starts_with("circle") {
            ComponentMessage::Circle
        } else if msg.starts_with("line") {
            ComponentMessage::Line
        } else {
            ComponentMessage::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassifiedUpdates {
    pub updates: Updates,
    pub rejections: RejectionTally,
    /// Component and tile entries that made it into `updates`.
    pub accepted: u32,
}

/// Staleness for component and tile entries. An unset (zero) watermark
/// accepts everything.
pub fn is_stale_guarded(timestamp: i64, watermark: i64) -> bool {
    watermark != 0 && timestamp < watermark
}

/// Staleness for chat, join and quit entries. No zero-watermark exemption.
pub fn is_stale(timestamp: i64, watermark: i64) -> bool {
    timestamp < watermark
}

pub fn classify_updates(entries: &[Value], watermark: i64) -> ClassifiedUpdates {
    let mut classified = ClassifiedUpdates::default();

    for entry in entries {
        let record = RawRecord::new(entry);
        let kind = record.string("type").and_then(|kind| EntryKind::parse(&kind));
        let outcome = match kind {
            Some(EntryKind::Component) => classify_component(record, watermark, &mut classified.updates),
            Some(EntryKind::Chat) => classify_chat(record, watermark, &mut classified.updates),
            Some(kind @ (EntryKind::PlayerJoin | EntryKind::PlayerQuit)) => {
                classify_presence(record, kind, watermark, &mut classified.updates)
            }
            Some(EntryKind::Tile) => classify_tile(record, watermark, &mut classified.updates),
            None => Err(UpdateRejection::UnknownEntryType),
        };

        match outcome {
            // Chat and presence events are not counted.
            Ok(()) if matches!(kind, Some(EntryKind::Component | EntryKind::Tile)) => {
                classified.accepted += 1
            }
            Ok(()) => {}
            Err(reason) => classified.rejections.record(reason),
        }
    }

    // Newest first. A full re-sort; equal timestamps keep no particular order.
    classified
        .updates
        .chat
        .sort_unstable_by(|one, two| two.timestamp.cmp(&one.timestamp));

    debug!(
        target: "atlas::updates",
        accepted = classified.accepted,
        rejected = classified.rejections.total(),
        rejections = ?classified.rejections,
        "updates.classified"
    );

    classified
}

fn shape_op<T>(id: &str, removed: bool, build: impl FnOnce() -> T) -> UpdateOp<T> {
    if removed {
        UpdateOp::Remove { id: id.to_string() }
    } else {
        UpdateOp::Upsert {
            id: id.to_string(),
            payload: build(),
        }
    }
}

fn classify_component(
    entry: RawRecord<'_>,
    watermark: i64,
    updates: &mut Updates,
) -> Result<(), UpdateRejection> {
    if let Some(timestamp) = entry.integer("timestamp") {
        if is_stale_guarded(timestamp, watermark) {
            return Err(UpdateRejection::Stale);
        }
    }

    let id = entry.string("id").ok_or(UpdateRejection::MissingId)?;
    let msg = entry.str_or("msg", "");
    let message = ComponentMessage::from_msg(&msg);

    // Set-level entries carry no `set` field; their id is the set.
    let set_id = match message {
        ComponentMessage::Set => id.clone(),
        _ => entry.string("set").ok_or(UpdateRejection::MissingSet)?,
    };

    if entry.string("ctype").as_deref() != Some("markers") {
        return Err(UpdateRejection::UnknownComponentType);
    }

    let removed = msg.ends_with("deleted");
    let diff = updates.marker_sets.entry(set_id.clone()).or_default();

    match message {
        ComponentMessage::Set => {
            diff.removed = removed;
            diff.payload = (!removed).then(|| build_marker_set_info(&set_id, entry));
        }
        ComponentMessage::Marker => diff
            .markers
            .push(shape_op(&id, removed, || build_marker(entry))),
        ComponentMessage::Area => diff.areas.push(shape_op(&id, removed, || build_area(entry))),
        ComponentMessage::Circle => diff
            .circles
            .push(shape_op(&id, removed, || build_circle(entry))),
        ComponentMessage::Line => diff.lines.push(shape_op(&id, removed, || build_line(entry))),
        ComponentMessage::Other => {}
    }

    Ok(())
}

fn classify_chat(
    entry: RawRecord<'_>,
    watermark: i64,
    updates: &mut Updates,
) -> Result<(), UpdateRejection> {
    let (Some(message), Some(timestamp)) = (entry.string("message"), entry.integer("timestamp"))
    else {
        return Err(UpdateRejection::Incomplete);
    };

    if is_stale(timestamp, watermark) {
        return Err(UpdateRejection::Stale);
    }

    let source = entry
        .string("source")
        .and_then(|source| ChatSource::parse(&source))
        .ok_or(UpdateRejection::UnsupportedSource)?;

    updates.chat.push(ChatMessage {
        timestamp,
        event: ChatEvent::Chat {
            source,
            player_account: entry.string("account"),
            player_name: entry.string("playerName"),
            message,
            channel: entry.string("channel"),
        },
    });
    Ok(())
}

fn classify_presence(
    entry: RawRecord<'_>,
    kind: EntryKind,
    watermark: i64,
    updates: &mut Updates,
) -> Result<(), UpdateRejection> {
    let (Some(player_account), Some(timestamp)) =
        (entry.string("account"), entry.integer("timestamp"))
    else {
        return Err(UpdateRejection::Incomplete);
    };

    if is_stale(timestamp, watermark) {
        return Err(UpdateRejection::Stale);
    }

    let player_name = entry.str_or("playerName", "");
    let event = if kind == EntryKind::PlayerJoin {
        ChatEvent::PlayerJoin {
            player_account,
            player_name,
        }
    } else {
        ChatEvent::PlayerLeave {
            player_account,
            player_name,
        }
    };

    updates.chat.push(ChatMessage { timestamp, event });
    Ok(())
}

fn classify_tile(
    entry: RawRecord<'_>,
    watermark: i64,
    updates: &mut Updates,
) -> Result<(), UpdateRejection> {
    let (Some(name), Some(timestamp)) = (entry.string("name"), entry.integer("timestamp")) else {
        return Err(UpdateRejection::Incomplete);
    };

    if is_stale_guarded(timestamp, watermark) {
        return Err(UpdateRejection::Stale);
    }

    updates.tiles.push(TileUpdate { name, timestamp });
    Ok(())
}
