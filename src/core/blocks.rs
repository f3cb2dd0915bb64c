//! Ordered render blocks for one message.

use serde::{Deserialize, Serialize};

use history_store::{INDICATOR_DESCRIPTION, INDICATOR_TITLE};
use stream_protocol::{BlockEvent, BlockKind};

/// Persisted `kind` tags reuse the wire block names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    #[serde(rename = "para")]
    Paragraph { content: String },
    ArtifactIndicator {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    #[serde(rename = "sum")]
    Summary { content: String },
    #[serde(rename = "sugg")]
    Suggestions { suggestions: Vec<String> },
    Conclusion { content: String },
}

impl Block {
    #[must_use]
    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::Paragraph {
            content: content.into(),
        }
    }

    /// Indicator with the stock configurator labels.
    #[must_use]
    pub fn default_indicator() -> Self {
        Self::ArtifactIndicator {
            title: Some(INDICATOR_TITLE.to_string()),
            description: Some(INDICATOR_DESCRIPTION.to_string()),
        }
    }

    pub fn is_indicator(&self) -> bool {
        matches!(self, Self::ArtifactIndicator { .. })
    }
}

/// What one block event did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Cleared,
    Appended,
    /// `artifact_start` after an indicator already exists.
    DuplicateIndicator,
    /// Artifact chunk or end; the caller merges the artifact.
    ArtifactOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockAssembler {
    blocks: Vec<Block>,
}

impl BlockAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &BlockEvent) -> BlockOutcome {
        let content = || event.content.clone().unwrap_or_default();
        let block = match event.kind {
            BlockKind::Init => {
                self.blocks.clear();
                return BlockOutcome::Cleared;
            }
            BlockKind::ArtifactChunk | BlockKind::ArtifactEnd => return BlockOutcome::ArtifactOnly,
            BlockKind::ArtifactStart if self.has_indicator() => {
                return BlockOutcome::DuplicateIndicator
            }
            BlockKind::ArtifactStart => Block::ArtifactIndicator {
                title: event.title.clone(),
                description: event.description.clone(),
            },
            BlockKind::Para => Block::Paragraph { content: content() },
            BlockKind::Summary => Block::Summary { content: content() },
            BlockKind::Suggestions => Block::Suggestions {
                suggestions: event.suggestions.clone(),
            },
            BlockKind::Conclusion => Block::Conclusion { content: content() },
        };
        self.blocks.push(block);
        BlockOutcome::Appended
    }

    /// Appends a block outside the event stream, keeping the single-indicator rule.
    pub fn push(&mut self, block: Block) -> bool {
        if block.is_indicator() && self.has_indicator() {
            return false;
        }
        self.blocks.push(block);
        true
    }

    pub fn has_indicator(&self) -> bool {
        self.blocks.iter().any(Block::is_indicator)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}
