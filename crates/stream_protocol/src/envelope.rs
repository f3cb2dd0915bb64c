use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Coarse discriminator of one wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Lifecycle,
    PartialField,
    Auxiliary,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Start,
    Complete,
    Error,
}

impl LifecycleKind {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "start" => Self::Start,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    pub kind: LifecycleKind,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Artifact fragment carried by `complete`; merged like any other fragment.
    pub data: Option<Value>,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, LifecycleKind::Complete | LifecycleKind::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialField {
    pub field: String,
    pub value: Value,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Init,
    Para,
    ArtifactStart,
    ArtifactChunk,
    ArtifactEnd,
    Summary,
    Suggestions,
    Conclusion,
}

impl BlockKind {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "init" => Self::Init,
            "para" => Self::Para,
            "artifact_start" => Self::ArtifactStart,
            "artifact_chunk" => Self::ArtifactChunk,
            "artifact_end" => Self::ArtifactEnd,
            "sum" => Self::Summary,
            "sugg" => Self::Suggestions,
            "conclusion" => Self::Conclusion,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Para => "para",
            Self::ArtifactStart => "artifact_start",
            Self::ArtifactChunk => "artifact_chunk",
            Self::ArtifactEnd => "artifact_end",
            Self::Summary => "sum",
            Self::Suggestions => "sugg",
            Self::Conclusion => "conclusion",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockEvent {
    pub kind: BlockKind,
    pub content: Option<String>,
    pub artifact: Option<Value>,
    pub suggestions: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl BlockEvent {
    #[must_use]
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            content: None,
            artifact: None,
            suggestions: Vec::new(),
            title: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifact = Some(artifact);
        self
    }

    #[must_use]
    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = String>) -> Self {
        self.suggestions = suggestions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_indicator(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Up,
    Down,
}

impl Feedback {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "up" => Self::Up,
            "down" => Self::Down,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtItem {
    pub text: String,
    /// Producer timestamp in epoch milliseconds; consumers stamp missing values on receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

/// Auxiliary channel payload attachable to any envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabs {
    pub answer: Option<String>,
    pub images: Vec<String>,
    pub sources: Vec<SourceLink>,
    pub thoughts: Vec<ThoughtItem>,
    /// `Some(None)` is an explicit `null` on the wire and clears feedback.
    pub feedback: Option<Option<Feedback>>,
}

impl Tabs {
    pub fn is_empty(&self) -> bool {
        self.answer.is_none()
            && self.images.is_empty()
            && self.sources.is_empty()
            && self.thoughts.is_empty()
            && self.feedback.is_none()
    }

    /// Decodes a bare `tabs` object, as persisted alongside a message.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        parse_tabs(value)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        if let Some(answer) = &self.answer {
            object.insert("answer".to_owned(), Value::String(answer.clone()));
        }
        if !self.images.is_empty() {
            object.insert("images".to_owned(), Value::from(self.images.clone()));
        }
        if !self.sources.is_empty() {
            object.insert("sources".to_owned(), to_json_or_null(&self.sources));
        }
        if !self.thoughts.is_empty() {
            object.insert("thoughts".to_owned(), to_json_or_null(&self.thoughts));
        }
        if let Some(feedback) = self.feedback {
            let value = feedback
                .map(|feedback| Value::String(feedback.as_str().to_owned()))
                .unwrap_or(Value::Null);
            object.insert("feedback".to_owned(), value);
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Lifecycle(Lifecycle),
    Partial(PartialField),
    Block(BlockEvent),
    /// Envelope that only carries `tabs`.
    Auxiliary,
}

/// One decoded wire unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub body: EnvelopeBody,
    pub tabs: Option<Tabs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("envelope must be a JSON object")]
    NotAnObject,
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unknown {key} discriminant '{value}'")]
    UnknownDiscriminant { key: &'static str, value: String },
    #[error("envelope carries no discriminant")]
    MissingDiscriminant,
}

impl DecodeError {
    /// Unknown or absent discriminants are dropped with a warning rather than
    /// counted as malformed frames.
    pub fn is_unknown_discriminant(&self) -> bool {
        matches!(
            self,
            Self::UnknownDiscriminant { .. } | Self::MissingDiscriminant
        )
    }
}

impl Envelope {
    #[must_use]
    pub fn start(message: impl Into<String>) -> Self {
        Self::from_body(EnvelopeBody::Lifecycle(Lifecycle {
            kind: LifecycleKind::Start,
            message: Some(message.into()),
            error: None,
            data: None,
        }))
    }

    #[must_use]
    pub fn complete(data: Option<Value>) -> Self {
        Self::from_body(EnvelopeBody::Lifecycle(Lifecycle {
            kind: LifecycleKind::Complete,
            message: None,
            error: None,
            data,
        }))
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::from_body(EnvelopeBody::Lifecycle(Lifecycle {
            kind: LifecycleKind::Error,
            message: None,
            error: Some(error.into()),
            data: None,
        }))
    }

    #[must_use]
    pub fn partial(field: impl Into<String>, value: Value, data: Value) -> Self {
        Self::from_body(EnvelopeBody::Partial(PartialField {
            field: field.into(),
            value,
            data,
        }))
    }

    #[must_use]
    pub fn block(event: BlockEvent) -> Self {
        Self::from_body(EnvelopeBody::Block(event))
    }

    #[must_use]
    pub fn auxiliary(tabs: Tabs) -> Self {
        Self {
            body: EnvelopeBody::Auxiliary,
            tabs: Some(tabs),
        }
    }

    #[must_use]
    pub fn with_tabs(mut self, tabs: Tabs) -> Self {
        self.tabs = Some(tabs);
        self
    }

    fn from_body(body: EnvelopeBody) -> Self {
        Self { body, tabs: None }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match &self.body {
            EnvelopeBody::Lifecycle(_) => EnvelopeKind::Lifecycle,
            EnvelopeBody::Partial(_) => EnvelopeKind::PartialField,
            EnvelopeBody::Block(_) => EnvelopeKind::Block,
            EnvelopeBody::Auxiliary => EnvelopeKind::Auxiliary,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(&self.body, EnvelopeBody::Lifecycle(lifecycle) if lifecycle.is_terminal())
    }

    /// Decodes a parsed JSON frame payload into a typed envelope.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let tabs = match object.remove("tabs") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_tabs(value)?),
        };

        let body = if let Some(block) = object.remove("block") {
            EnvelopeBody::Block(parse_block(block, &mut object)?)
        } else if let Some(kind) = object.remove("type") {
            parse_typed(kind, &mut object)?
        } else if tabs.is_some() {
            EnvelopeBody::Auxiliary
        } else {
            return Err(DecodeError::MissingDiscriminant);
        };

        Ok(Self { body, tabs })
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        match &self.body {
            EnvelopeBody::Lifecycle(lifecycle) => {
                object.insert("type".to_owned(), lifecycle.kind.as_str().into());
                insert_opt_string(&mut object, "message", &lifecycle.message);
                insert_opt_string(&mut object, "error", &lifecycle.error);
                if let Some(data) = &lifecycle.data {
                    object.insert("data".to_owned(), data.clone());
                }
            }
            EnvelopeBody::Partial(partial) => {
                object.insert("type".to_owned(), "partial".into());
                object.insert("field".to_owned(), partial.field.clone().into());
                object.insert("value".to_owned(), partial.value.clone());
                object.insert("data".to_owned(), partial.data.clone());
            }
            EnvelopeBody::Block(block) => {
                object.insert("block".to_owned(), block.kind.as_str().into());
                insert_opt_string(&mut object, "content", &block.content);
                if let Some(artifact) = &block.artifact {
                    object.insert("artifact".to_owned(), artifact.clone());
                }
                if !block.suggestions.is_empty() {
                    object.insert("suggestions".to_owned(), Value::from(block.suggestions.clone()));
                }
                insert_opt_string(&mut object, "title", &block.title);
                insert_opt_string(&mut object, "description", &block.description);
            }
            EnvelopeBody::Auxiliary => {}
        }

        if let Some(tabs) = &self.tabs {
            object.insert("tabs".to_owned(), tabs.to_value());
        }

        Value::Object(object)
    }
}

fn parse_typed(kind: Value, object: &mut Map<String, Value>) -> Result<EnvelopeBody, DecodeError> {
    let Value::String(kind) = kind else {
        return Err(DecodeError::InvalidField {
            field: "type",
            expected: "a string",
        });
    };

    if kind == "partial" {
        let field = take_opt_string(object, "field")?.ok_or(DecodeError::MissingField("field"))?;
        let value = object.remove("value").unwrap_or(Value::Null);
        let data = match object.remove("data") {
            Some(data @ Value::Object(_)) => data,
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: "data",
                    expected: "an object",
                })
            }
            None => return Err(DecodeError::MissingField("data")),
        };
        return Ok(EnvelopeBody::Partial(PartialField { field, value, data }));
    }

    let Some(lifecycle) = LifecycleKind::parse(&kind) else {
        return Err(DecodeError::UnknownDiscriminant {
            key: "type",
            value: kind,
        });
    };

    let data = match object.remove("data") {
        None | Some(Value::Null) => None,
        Some(data @ Value::Object(_)) => Some(data),
        Some(_) => {
            return Err(DecodeError::InvalidField {
                field: "data",
                expected: "an object",
            })
        }
    };

    Ok(EnvelopeBody::Lifecycle(Lifecycle {
        kind: lifecycle,
        message: take_text(object, "message"),
        error: take_text(object, "error"),
        data,
    }))
}

fn parse_block(kind: Value, object: &mut Map<String, Value>) -> Result<BlockEvent, DecodeError> {
    let Value::String(kind) = kind else {
        return Err(DecodeError::InvalidField {
            field: "block",
            expected: "a string",
        });
    };
    let Some(kind) = BlockKind::parse(&kind) else {
        return Err(DecodeError::UnknownDiscriminant {
            key: "block",
            value: kind,
        });
    };

    let artifact = match object.remove("artifact") {
        None | Some(Value::Null) => None,
        Some(artifact @ Value::Object(_)) => Some(artifact),
        Some(_) => {
            return Err(DecodeError::InvalidField {
                field: "artifact",
                expected: "an object",
            })
        }
    };

    let suggestions = match object.remove("suggestions") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => string_list(value, "suggestions")?,
    };

    Ok(BlockEvent {
        kind,
        content: take_opt_string(object, "content")?,
        artifact,
        suggestions,
        title: take_opt_string(object, "title")?,
        description: take_opt_string(object, "description")?,
    })
}

fn parse_tabs(value: Value) -> Result<Tabs, DecodeError> {
    let Value::Object(mut object) = value else {
        return Err(DecodeError::InvalidField {
            field: "tabs",
            expected: "an object",
        });
    };

    let images = match object.remove("images") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => string_list(value, "tabs.images")?,
    };

    let sources = match object.remove("sources") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value::<Vec<SourceLink>>(value).map_err(|_| {
            DecodeError::InvalidField {
                field: "tabs.sources",
                expected: "an array of {title, url, source?}",
            }
        })?,
    };

    let thoughts = match object.remove("thoughts") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(ThoughtItem { text, ts: None }),
                other => serde_json::from_value::<ThoughtItem>(other).map_err(|_| {
                    DecodeError::InvalidField {
                        field: "tabs.thoughts",
                        expected: "an array of strings or {text, ts?}",
                    }
                }),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(DecodeError::InvalidField {
                field: "tabs.thoughts",
                expected: "an array",
            })
        }
    };

    let feedback = match object.remove("feedback") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(value)) => match Feedback::parse(&value) {
            Some(feedback) => Some(Some(feedback)),
            None => {
                return Err(DecodeError::InvalidField {
                    field: "tabs.feedback",
                    expected: "\"up\", \"down\" or null",
                })
            }
        },
        Some(_) => {
            return Err(DecodeError::InvalidField {
                field: "tabs.feedback",
                expected: "\"up\", \"down\" or null",
            })
        }
    };

    Ok(Tabs {
        answer: take_opt_string(&mut object, "answer")?,
        images,
        sources,
        thoughts,
        feedback,
    })
}

fn take_opt_string(
    object: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, DecodeError> {
    match object.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(DecodeError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

/// Lenient text extraction for human-readable lifecycle fields.
fn take_text(object: &mut Map<String, Value>, field: &str) -> Option<String> {
    match object.remove(field)? {
        Value::Null => None,
        Value::String(value) => Some(value),
        Value::Object(nested) => match nested.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            _ => Some(Value::Object(nested).to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn string_list(value: Value, field: &'static str) -> Result<Vec<String>, DecodeError> {
    let invalid = DecodeError::InvalidField {
        field,
        expected: "an array of strings",
    };
    let Value::Array(items) = value else {
        return Err(invalid);
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(value) => Ok(value),
            _ => Err(invalid.clone()),
        })
        .collect()
}

fn insert_opt_string(object: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        object.insert(key.to_owned(), Value::String(value.clone()));
    }
}

fn to_json_or_null<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
