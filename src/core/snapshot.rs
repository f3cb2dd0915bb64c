//! `jsonData` mirror written into transcript entries.

use serde_json::{Map, Value};

use crate::core::artifact::Artifact;
use crate::core::blocks::Block;
use crate::core::channels::AuxiliaryChannels;

/// Builds the persisted mirror of one message's accumulated state.
///
/// Returns `None` while nothing has accumulated. Once anything has, the mirror
/// always carries a `blocks` array so history normalization leaves it untouched
/// on reload.
#[must_use]
pub fn json_data(
    artifact: &Artifact,
    blocks: &[Block],
    channels: &AuxiliaryChannels,
) -> Option<Value> {
    if artifact.is_empty() && blocks.is_empty() && channels.is_empty() {
        return None;
    }

    let mut data = match artifact.to_value() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    data.insert(
        "blocks".to_owned(),
        serde_json::to_value(blocks).unwrap_or_else(|_| Value::Array(Vec::new())),
    );
    if !channels.is_empty() {
        data.insert("tabs".to_owned(), channels.to_value());
    }
    Some(Value::Object(data))
}
