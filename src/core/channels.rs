//! Auxiliary channel accumulators: thoughts, sources, images, answer and feedback.

use serde_json::Value;

use stream_protocol::{Feedback, SourceLink, Tabs, ThoughtItem};

/// Per-message auxiliary state.
///
/// List channels only grow until [`AuxiliaryChannels::reset`]. The answer is
/// cumulative text from the producer, so it is replaced rather than appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryChannels {
    thoughts: Vec<ThoughtItem>,
    sources: Vec<SourceLink>,
    images: Vec<String>,
    answer: Option<String>,
    feedback: Option<Feedback>,
}

/// Number of items each channel gained from one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelDelta {
    pub thoughts: usize,
    pub sources: usize,
    pub images: usize,
    pub answer: bool,
    pub feedback: bool,
}

impl ChannelDelta {
    pub fn is_empty(&self) -> bool {
        self.thoughts == 0 && self.sources == 0 && self.images == 0 && !self.answer && !self.feedback
    }
}

impl AuxiliaryChannels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels rebuilt from a persisted `tabs` mirror.
    #[must_use]
    pub fn from_tabs(tabs: &Tabs) -> Self {
        let mut channels = Self::new();
        channels.apply_tabs(tabs, 0);
        channels
    }

    /// Appends thoughts, stamping `received_at` on items the producer left undated.
    pub fn append_thoughts(
        &mut self,
        thoughts: impl IntoIterator<Item = ThoughtItem>,
        received_at: i64,
    ) -> usize {
        let before = self.thoughts.len();
        self.thoughts.extend(thoughts.into_iter().map(|thought| ThoughtItem {
            ts: Some(thought.ts.unwrap_or(received_at)),
            ..thought
        }));
        self.thoughts.len() - before
    }

    pub fn append_sources(&mut self, sources: impl IntoIterator<Item = SourceLink>) -> usize {
        let before = self.sources.len();
        self.sources.extend(sources);
        self.sources.len() - before
    }

    pub fn append_images(&mut self, images: impl IntoIterator<Item = String>) -> usize {
        let before = self.images.len();
        self.images.extend(images);
        self.images.len() - before
    }

    pub fn set_answer(&mut self, answer: impl Into<String>) -> bool {
        let answer = answer.into();
        if self.answer.as_deref() == Some(answer.as_str()) {
            return false;
        }
        self.answer = Some(answer);
        true
    }

    pub fn set_feedback(&mut self, feedback: Option<Feedback>) -> bool {
        if self.feedback == feedback {
            return false;
        }
        self.feedback = feedback;
        true
    }

    /// Sets `feedback`, or clears it when the same value is already set.
    pub fn toggle_feedback(&mut self, feedback: Feedback) -> Option<Feedback> {
        let next = if self.feedback == Some(feedback) {
            None
        } else {
            Some(feedback)
        };
        self.feedback = next;
        next
    }

    /// Folds one `tabs` payload into the channels.
    pub fn apply_tabs(&mut self, tabs: &Tabs, received_at: i64) -> ChannelDelta {
        ChannelDelta {
            thoughts: self.append_thoughts(tabs.thoughts.iter().cloned(), received_at),
            sources: self.append_sources(tabs.sources.iter().cloned()),
            images: self.append_images(tabs.images.iter().cloned()),
            answer: tabs
                .answer
                .as_ref()
                .is_some_and(|answer| self.set_answer(answer.clone())),
            feedback: tabs
                .feedback
                .is_some_and(|feedback| self.set_feedback(feedback)),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn thoughts(&self) -> &[ThoughtItem] {
        &self.thoughts
    }

    pub fn sources(&self) -> &[SourceLink] {
        &self.sources
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn feedback(&self) -> Option<Feedback> {
        self.feedback
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
            && self.sources.is_empty()
            && self.images.is_empty()
            && self.answer.is_none()
            && self.feedback.is_none()
    }

    /// Mirror in the wire `tabs` shape.
    pub fn to_tabs(&self) -> Tabs {
        Tabs {
            answer: self.answer.clone(),
            images: self.images.clone(),
            sources: self.sources.clone(),
            thoughts: self.thoughts.clone(),
            feedback: self.feedback.map(Some),
        }
    }

    pub fn to_value(&self) -> Value {
        self.to_tabs().to_value()
    }
}
