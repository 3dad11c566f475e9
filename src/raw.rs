//! Tag-carrying raw parse tree, built directly from the `yaml-rust2` event stream.
//!
//! This mirrors the event-driven builder in `quarto-yaml`'s parser: it walks
//! `Event`s via `MarkedEventReceiver` rather than going through `yaml_rust2::Yaml`,
//! because the construction pass needs the tag on every node (not just scalars)
//! to dispatch directives, and needs precise marker-based origin before any
//! higher-level resolution happens.

use crate::error::{Error, Result};
use crate::origin::Origin;
use std::sync::Arc;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

#[derive(Debug, Clone)]
pub(crate) struct RawTag {
    pub handle: String,
    pub suffix: String,
}

#[derive(Debug, Clone)]
pub(crate) enum RawKind {
    Scalar { text: String, style: TScalarStyle },
    Sequence(Vec<RawNode>),
    Mapping(Vec<(RawNode, RawNode)>),
}

#[derive(Debug, Clone)]
pub(crate) struct RawNode {
    pub kind: RawKind,
    pub tag: Option<RawTag>,
    pub origin: Origin,
}

impl RawNode {
    /// The tag suffix, if the node carries a custom (single-`!`) local tag —
    /// the form our directives use (`!secret`, `!for`, ...).
    pub fn directive_tag(&self) -> Option<&str> {
        match &self.tag {
            Some(t) if t.handle == "!" => Some(t.suffix.as_str()),
            _ => None,
        }
    }

    /// The tag suffix, if the node carries a resolved standard tag
    /// (`tag:yaml.org,2002:...`, written `!!xxx`).
    pub fn standard_tag(&self) -> Option<&str> {
        match &self.tag {
            Some(t) if t.handle == "!!" => Some(t.suffix.as_str()),
            _ => None,
        }
    }

    pub fn find_mapping_entry<'a>(&'a self, key: &str) -> Option<(&'a RawNode, &'a RawNode)> {
        match &self.kind {
            RawKind::Mapping(entries) => entries.iter().find_map(|(k, v)| match &k.kind {
                RawKind::Scalar { text, .. } if text == key => Some((k, v)),
                _ => None,
            }),
            _ => None,
        }
    }

    pub fn find_mapping_value(&self, key: &str) -> Option<&RawNode> {
        self.find_mapping_entry(key).map(|(_, v)| v)
    }
}

fn origin_at(marker: Marker, file: Option<Arc<std::path::Path>>) -> Origin {
    Origin::new(file, marker.line(), marker.col() + 1)
}

enum Frame {
    Sequence {
        tag: Option<RawTag>,
        start: Marker,
        items: Vec<RawNode>,
    },
    Mapping {
        tag: Option<RawTag>,
        start: Marker,
        entries: Vec<(RawNode, RawNode)>,
        pending_key: Option<RawNode>,
    },
}

struct RawBuilder {
    file: Option<Arc<std::path::Path>>,
    stack: Vec<Frame>,
    finished: Vec<RawNode>,
    error: Option<Error>,
}

impl RawBuilder {
    fn new(file: Option<Arc<std::path::Path>>) -> Self {
        RawBuilder {
            file,
            stack: Vec::new(),
            finished: Vec::new(),
            error: None,
        }
    }

    fn push_finished(&mut self, node: RawNode) {
        match self.stack.last_mut() {
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping {
                entries,
                pending_key,
                ..
            }) => {
                if let Some(key) = pending_key.take() {
                    entries.push((key, node));
                } else {
                    *pending_key = Some(node);
                }
            }
            None => self.finished.push(node),
        }
    }

    fn raw_tag(tag: &Option<yaml_rust2::Tag>) -> Option<RawTag> {
        tag.as_ref().map(|t| RawTag {
            handle: t.handle.clone(),
            suffix: t.suffix.clone(),
        })
    }
}

impl MarkedEventReceiver for RawBuilder {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        match ev {
            Event::Scalar(value, style, _anchor_id, tag) => {
                let origin = origin_at(marker, self.file.clone()).extended_over(&value);
                let node = RawNode {
                    kind: RawKind::Scalar { text: value, style },
                    tag: Self::raw_tag(&tag),
                    origin,
                };
                self.push_finished(node);
            }
            Event::SequenceStart(_anchor_id, tag) => {
                self.stack.push(Frame::Sequence {
                    tag: Self::raw_tag(&tag),
                    start: marker,
                    items: Vec::new(),
                });
            }
            Event::SequenceEnd => {
                if let Some(Frame::Sequence { tag, start, items }) = self.stack.pop() {
                    let origin = origin_at(start, self.file.clone())
                        .with_end(marker.line(), marker.col() + 1);
                    self.push_finished(RawNode {
                        kind: RawKind::Sequence(items),
                        tag,
                        origin,
                    });
                }
            }
            Event::MappingStart(_anchor_id, tag) => {
                self.stack.push(Frame::Mapping {
                    tag: Self::raw_tag(&tag),
                    start: marker,
                    entries: Vec::new(),
                    pending_key: None,
                });
            }
            Event::MappingEnd => {
                if let Some(Frame::Mapping {
                    tag,
                    start,
                    entries,
                    ..
                }) = self.stack.pop()
                {
                    let origin = origin_at(start, self.file.clone())
                        .with_end(marker.line(), marker.col() + 1);
                    self.push_finished(RawNode {
                        kind: RawKind::Mapping(entries),
                        tag,
                        origin,
                    });
                }
            }
            Event::Alias(_) => {
                self.error = Some(Error::parse(
                    "anchors/aliases are not supported",
                    Some(origin_at(marker, self.file.clone())),
                ));
            }
            Event::Nothing | Event::StreamStart | Event::StreamEnd | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}

/// Parses `text` into a single raw document tree. `file` is used only for
/// origin reporting (it does not need to exist on disk).
pub(crate) fn parse_document(
    text: &str,
    file: Option<Arc<std::path::Path>>,
) -> Result<RawNode> {
    let mut builder = RawBuilder::new(file);
    let mut parser = Parser::new_from_str(text);
    parser.load(&mut builder, false)?;
    if let Some(err) = builder.error {
        return Err(err);
    }
    builder
        .finished
        .pop()
        .ok_or_else(|| Error::parse("empty document", None))
}
