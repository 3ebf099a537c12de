//! Extraction of UI action directives from free-form model output.
//!
//! Model text mixes prose, marker lines and JSON-like objects such as
//! `{'action': 'CLICK', 'position': [0.49, 0.94], 'value': None}`. Objects are
//! located with a brace tokenizer that ignores braces inside quoted strings,
//! Python literals are rewritten to JSON, and each candidate is decoded on its
//! own so one malformed object never hides the others.

use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, trace};

/// Marker asking the assistant to retreat immediately.
pub const HIDE_MARKER: &str = "COMMAND_HIDE_GHOSTY";
/// Marker (case-insensitive) signalling the task is done.
pub const COMPLETED_MARKER: &str = "TASK_STATUS: completed";
/// Prefix of the model's reasoning line.
pub const THOUGHT_MARKER: &str = "THOUGHT:";

const STATUS_PREFIX: &str = "task_status:";

/// Symbolic UI action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Click,
    Input,
    Enter,
    /// Anything else, upper-cased.
    Other(String),
}

impl ActionKind {
    /// Parse an action name case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CLICK" => Self::Click,
            "INPUT" => Self::Input,
            "ENTER" => Self::Enter,
            _ => Self::Other(upper),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Click => "CLICK",
            Self::Input => "INPUT",
            Self::Enter => "ENTER",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A screen position with both coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    /// Returns `None` unless both coordinates are finite and within `[0, 1]`.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Option<Self> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        (in_range(x) && in_range(y)).then_some(Self { x, y })
    }
}

impl fmt::Display for NormalizedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One structured instruction extracted from model text.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDirective {
    pub action: ActionKind,
    pub position: Option<NormalizedPoint>,
    pub value: Option<String>,
    pub task_status: Option<String>,
}

impl ActionDirective {
    /// A directive with only an action kind.
    #[must_use]
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            position: None,
            value: None,
            task_status: None,
        }
    }

    #[must_use]
    pub fn at(mut self, position: NormalizedPoint) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// History line, e.g. `INPUT at (0.49, 0.94) with value '67'`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = self.action.to_string();
        if let Some(position) = self.position {
            line.push_str(&format!(" at {position}"));
        }
        if let Some(value) = &self.value {
            line.push_str(&format!(" with value '{value}'"));
        }
        line
    }
}

/// Everything extracted from one model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTurn {
    pub directives: Vec<ActionDirective>,
    pub task_completed: bool,
    pub hide_requested: bool,
    pub thought: Option<String>,
    /// Text with marker lines removed, shown when there is nothing to execute.
    pub reply: String,
}

impl ParsedTurn {
    /// Whether the turn's only directive is `ENTER`.
    #[must_use]
    pub fn is_enter_only(&self) -> bool {
        matches!(self.directives.as_slice(), [only] if only.action == ActionKind::Enter)
    }
}

/// Parse one block of model output.
#[must_use]
pub fn parse_turn(text: &str) -> ParsedTurn {
    let mut turn = ParsedTurn {
        task_completed: text
            .to_lowercase()
            .contains(&COMPLETED_MARKER.to_lowercase()),
        hide_requested: text.contains(HIDE_MARKER),
        thought: extract_thought(text),
        reply: strip_marker_lines(text),
        ..Default::default()
    };

    let mut objects = Vec::new();
    for candidate in extract_objects(text) {
        collect_directive_objects(candidate, &mut objects);
    }

    for object in objects {
        if let Some(status) = object.get("task_status").and_then(Value::as_str) {
            turn.task_completed = status.trim().eq_ignore_ascii_case("completed");
        }
        if let Some(directive) = directive_from_object(&object) {
            turn.directives.push(directive);
        }
    }

    debug!(
        directives = turn.directives.len(),
        task_completed = turn.task_completed,
        hide_requested = turn.hide_requested,
        "parsed model turn"
    );
    turn
}

fn extract_thought(text: &str) -> Option<String> {
    let start = text.find(THOUGHT_MARKER)? + THOUGHT_MARKER.len();
    let rest = &text[start..];
    let line = rest.split('\n').next().unwrap_or_default().trim();
    (!line.is_empty()).then(|| line.to_owned())
}

fn strip_marker_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.to_lowercase().starts_with(STATUS_PREFIX)
                || trimmed.starts_with(THOUGHT_MARKER)
                || trimmed.contains(HIDE_MARKER))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Decode `candidate`; descend into it when it is not itself a directive.
fn collect_directive_objects(candidate: &str, out: &mut Vec<Map<String, Value>>) {
    match serde_json::from_str::<Value>(&normalize_python_literals(candidate)) {
        Ok(value) => collect_from_value(value, out),
        Err(e) => {
            trace!(error = %e, "skipping undecodable candidate");
            if let Some(inner) = candidate
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                for nested in extract_objects(inner) {
                    collect_directive_objects(nested, out);
                }
            }
        }
    }
}

fn collect_from_value(value: Value, out: &mut Vec<Map<String, Value>>) {
    match value {
        Value::Object(map) if map.contains_key("action") || map.contains_key("task_status") => {
            out.push(map);
        }
        Value::Object(map) => {
            for (_, nested) in map {
                collect_from_value(nested, out);
            }
        }
        Value::Array(items) => {
            for nested in items {
                collect_from_value(nested, out);
            }
        }
        _ => {}
    }
}

fn directive_from_object(object: &Map<String, Value>) -> Option<ActionDirective> {
    let action = ActionKind::parse(object.get("action")?.as_str()?);
    let position = object.get("position").and_then(parse_position);
    let value = match object.get("value") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    };
    let task_status = object
        .get("task_status")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(ActionDirective {
        action,
        position,
        value,
        task_status,
    })
}

fn parse_position(value: &Value) -> Option<NormalizedPoint> {
    match value.as_array()?.as_slice() {
        [x, y] => NormalizedPoint::new(x.as_f64()?, y.as_f64()?),
        _ => None,
    }
}

/// Find balanced top-level `{…}` spans, skipping braces inside quoted strings.
///
/// An unbalanced opening brace is abandoned and scanning resumes just after it.
fn extract_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        match balanced_end(bytes, start) {
            Some(end) => {
                objects.push(&text[start..=end]);
                cursor = end + 1;
            }
            None => cursor = start + 1,
        }
    }
    objects
}

/// Index of the `}` closing the `{` at `start`, if any.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite Python literals to JSON outside string literals.
///
/// `None`/`True`/`False` become `null`/`true`/`false` and single-quoted
/// strings become double-quoted ones.
fn normalize_python_literals(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push('"');
                let mut escaped = false;
                for s in chars.by_ref() {
                    out.push(s);
                    if escaped {
                        escaped = false;
                    } else if s == '\\' {
                        escaped = true;
                    } else if s == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                out.push('"');
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(other) => {
                                out.push('\\');
                                out.push(other);
                            }
                            None => out.push_str("\\\\"),
                        },
                        '"' => out.push_str("\\\""),
                        '\'' => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    out
}
