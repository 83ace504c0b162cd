//! Response templates: a closed set of segment kinds parsed from tagged text.
//!
//! Template text is plain prose with two kinds of markup:
//!
//! - `{N}`: the N-th (0-based) wildcard capture of the matched pattern.
//! - XML-style tags:
//!   - `<srai>TEXT</srai>`: redirect, re-submit TEXT to the matcher
//!   - `<get name="x"/>`: read a session fact
//!   - `<learned/>`: summary of everything learned in the session
//!   - `<kb subject="S" view="is|has|can|definition|summary|infer|count"/>`:
//!     knowledge read; an optional `else="TEXT"` replaces the empty answer
//!   - `<learn name="x" value="V"/>`: bind a session fact
//!   - `<prefer value="V"/>`: record a session preference
//!   - `<fact subject="S" predicate="is|has|can" object="O"/>`: store a fact
//!   - `<relate subject="S" relation="isa|partof|usedfor" object="O"/>`: store a relation
//!
//! Attribute values and `<srai>` bodies may themselves contain `{N}`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RuleError, RuleResult};
use crate::knowledge::{Predicate, Relation};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<\s*(/?)\s*([A-Za-z]+)((?:\s+[A-Za-z_]+\s*=\s*"[^"]*")*)\s*(/?)\s*>"#)
        .expect("tag regex is valid")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_]+)\s*=\s*"([^"]*)""#).expect("attribute regex is valid")
});

static CAPTURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}").expect("capture regex is valid"));

// ---------------------------------------------------------------------------
// Segment types
// ---------------------------------------------------------------------------

/// Restricted segment used inside attribute values and redirect bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    Capture(usize),
}

/// Which slice of the knowledge base a `<kb/>` tag renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KbView {
    /// Objects of `IS` facts.
    Is,
    /// Objects of `HAS` facts.
    Has,
    /// Objects of `CAN` facts.
    Can,
    /// `IS` facts as a sentence: "S is O."
    Definition,
    /// Every fact and relation about the subject.
    Summary,
    /// Direct `IS_A` edges plus transitive inferences.
    Infer,
    /// Total number of stored facts.
    Count,
}

impl KbView {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "is" => Some(Self::Is),
            "has" => Some(Self::Has),
            "can" => Some(Self::Can),
            "definition" | "define" => Some(Self::Definition),
            "summary" | "all" => Some(Self::Summary),
            "infer" | "inference" => Some(Self::Infer),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    /// Whether this view needs a `subject` attribute.
    pub fn needs_subject(self) -> bool {
        !matches!(self, Self::Count)
    }
}

/// A read-only reference into session or knowledge state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactRef {
    /// A named session fact.
    Session { name: String },
    /// Everything learned in the session.
    SessionSummary,
    /// A knowledge base lookup. `otherwise` is rendered when it finds nothing.
    Knowledge {
        subject: Vec<Part>,
        view: KbView,
        otherwise: Option<Vec<Part>>,
    },
}

/// One executable piece of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Text(String),
    Capture(usize),
    Fact(FactRef),
    Redirect(Vec<Part>),
    Learn { name: String, value: Vec<Part> },
    Prefer { value: Vec<Part> },
    StoreFact {
        subject: Vec<Part>,
        predicate: Predicate,
        object: Vec<Part>,
    },
    StoreRelation {
        subject: Vec<Part>,
        relation: Relation,
        object: Vec<Part>,
    },
}

impl Segment {
    /// Whether executing this segment mutates session or knowledge state.
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Self::Learn { .. } | Self::Prefer { .. } | Self::StoreFact { .. } | Self::StoreRelation { .. }
        )
    }

    fn parts(&self) -> Vec<&[Part]> {
        match self {
            Self::Text(_) | Self::Capture(_) => Vec::new(),
            Self::Fact(FactRef::Knowledge {
                subject,
                otherwise: Some(otherwise),
                ..
            }) => vec![subject, otherwise],
            Self::Fact(FactRef::Knowledge { subject, .. }) => vec![subject],
            Self::Fact(_) => Vec::new(),
            Self::Redirect(body) => vec![body],
            Self::Learn { value, .. } | Self::Prefer { value } => vec![value],
            Self::StoreFact { subject, object, .. } | Self::StoreRelation { subject, object, .. } => {
                vec![subject, object]
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A parsed response template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse template text.
    pub fn parse(text: &str) -> RuleResult<Self> {
        let mut segments = Vec::new();
        let mut redirect: Option<Vec<Part>> = None;
        let mut cursor = 0;

        for caps in TAG_RE.captures_iter(text) {
            let whole = caps.get(0).expect("group 0 always present");
            let between = &text[cursor..whole.start()];
            cursor = whole.end();

            match redirect.as_mut() {
                Some(body) => body.extend(parse_parts(between)?),
                None => push_text(&mut segments, between)?,
            }

            let closing = !caps[1].is_empty();
            let name = caps[2].to_lowercase();
            let self_closing = !caps[4].is_empty();
            let attrs = parse_attrs(caps.get(3).map_or("", |m| m.as_str()));

            if let Some(body) = redirect.take() {
                if closing && name == "srai" {
                    if body.is_empty() {
                        return Err(malformed("empty <srai> body"));
                    }
                    segments.push(Segment::Redirect(body));
                    continue;
                }
                return Err(malformed(format!("<{name}> is not allowed inside <srai>")));
            }

            if closing {
                return Err(malformed(format!("unexpected closing tag </{name}>")));
            }

            if name == "srai" {
                if self_closing {
                    return Err(malformed("<srai/> needs a body"));
                }
                redirect = Some(Vec::new());
                continue;
            }

            if !self_closing {
                return Err(malformed(format!("<{name}> must be self-closing")));
            }
            segments.push(parse_tag(&name, &attrs)?);
        }

        if redirect.is_some() {
            return Err(malformed("unclosed <srai>"));
        }
        push_text(&mut segments, &text[cursor..])?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Highest capture index referenced anywhere, if any.
    pub fn max_capture(&self) -> Option<usize> {
        let top = self.segments.iter().filter_map(|s| match s {
            Segment::Capture(i) => Some(*i),
            _ => None,
        });
        let nested = self
            .segments
            .iter()
            .flat_map(|s| s.parts())
            .flat_map(|parts| parts.iter())
            .filter_map(|p| match p {
                Part::Capture(i) => Some(*i),
                Part::Text(_) => None,
            });
        top.chain(nested).max()
    }

    /// Whether the template contains at least one redirect.
    pub fn has_redirect(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Redirect(_)))
    }

    /// Redirect bodies that contain no captures, as plain text.
    ///
    /// These can be checked for resolvability before the rule goes live.
    pub fn literal_redirects(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Redirect(body) if body.iter().all(|p| matches!(p, Part::Text(_))) => {
                    Some(
                        body.iter()
                            .map(|p| match p {
                                Part::Text(t) => t.as_str(),
                                Part::Capture(_) => "",
                            })
                            .collect::<String>(),
                    )
                }
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn malformed(message: impl Into<String>) -> RuleError {
    RuleError::MalformedTemplate {
        message: message.into(),
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) -> RuleResult<()> {
    for part in parse_parts(text)? {
        match part {
            Part::Text(t) => match segments.last_mut() {
                Some(Segment::Text(prev)) => prev.push_str(&t),
                _ => segments.push(Segment::Text(t)),
            },
            Part::Capture(i) => segments.push(Segment::Capture(i)),
        }
    }
    Ok(())
}

/// Split text into literal runs and `{N}` captures, decoding XML entities.
pub(crate) fn parse_parts(text: &str) -> RuleResult<Vec<Part>> {
    if looks_like_markup(text) {
        return Err(malformed(format!("unrecognized markup in \"{}\"", text.trim())));
    }

    let mut parts = Vec::new();
    let mut cursor = 0;
    for caps in CAPTURE_RE.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > cursor {
            parts.push(Part::Text(decode_entities(&text[cursor..whole.start()])));
        }
        let index = caps[1]
            .parse::<usize>()
            .map_err(|e| malformed(format!("bad capture index {}: {e}", &caps[1])))?;
        parts.push(Part::Capture(index));
        cursor = whole.end();
    }
    if cursor < text.len() {
        parts.push(Part::Text(decode_entities(&text[cursor..])));
    }
    Ok(parts)
}

fn looks_like_markup(text: &str) -> bool {
    text.char_indices().any(|(i, c)| {
        c == '<'
            && text[i + 1..]
                .chars()
                .next()
                .is_some_and(|n| n.is_ascii_alphabetic() || n == '/')
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

fn parse_attrs(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|c| (c[1].to_lowercase(), c[2].to_string()))
        .collect()
}

fn required<'a>(tag: &str, attrs: &'a HashMap<String, String>, key: &str) -> RuleResult<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| malformed(format!("<{tag}/> requires a non-empty `{key}` attribute")))
}

fn parse_tag(name: &str, attrs: &HashMap<String, String>) -> RuleResult<Segment> {
    match name {
        "get" => Ok(Segment::Fact(FactRef::Session {
            name: required(name, attrs, "name")?.trim().to_lowercase(),
        })),
        "learned" => Ok(Segment::Fact(FactRef::SessionSummary)),
        "kb" => {
            let raw_view = required(name, attrs, "view")?;
            let view = KbView::parse(raw_view)
                .ok_or_else(|| malformed(format!("unknown <kb/> view \"{raw_view}\"")))?;
            let subject = if view.needs_subject() {
                parse_parts(required(name, attrs, "subject")?)?
            } else {
                Vec::new()
            };
            let otherwise = attrs.get("else").map(|text| parse_parts(text)).transpose()?;
            Ok(Segment::Fact(FactRef::Knowledge {
                subject,
                view,
                otherwise,
            }))
        }
        "learn" => Ok(Segment::Learn {
            name: required(name, attrs, "name")?.trim().to_lowercase(),
            value: parse_parts(required(name, attrs, "value")?)?,
        }),
        "prefer" => Ok(Segment::Prefer {
            value: parse_parts(required(name, attrs, "value")?)?,
        }),
        "fact" => {
            let predicate = Predicate::parse(required(name, attrs, "predicate")?)
                .map_err(|e| malformed(e.to_string()))?;
            Ok(Segment::StoreFact {
                subject: parse_parts(required(name, attrs, "subject")?)?,
                predicate,
                object: parse_parts(required(name, attrs, "object")?)?,
            })
        }
        "relate" => {
            let relation = Relation::parse(required(name, attrs, "relation")?)
                .map_err(|e| malformed(e.to_string()))?;
            Ok(Segment::StoreRelation {
                subject: parse_parts(required(name, attrs, "subject")?)?,
                relation,
                object: parse_parts(required(name, attrs, "object")?)?,
            })
        }
        other => Err(malformed(format!("unknown tag <{other}>"))),
    }
}
