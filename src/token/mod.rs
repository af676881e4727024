//! The token data model: the four kinds of line the parser recognises, and
//! the [`Token`] wrapper that carries the analyser's shadow-state snapshots
//! and runtime estimate.

pub mod sequence;

pub use sequence::{TokenId, TokenSequence};

use crate::state::MachineState;

/// A single `letter=value` parameter of a structured `;;` marker comment.
/// The marker grammar only ever needs integers and floats, so this stays a
/// two-variant sum rather than a generic scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Int(v) => *v as f64,
            ParamValue::Float(v) => *v,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            ParamValue::Int(v) => *v,
            ParamValue::Float(v) => *v as i64,
        }
    }
}

/// A `G`/`M` line: mnemonic plus an ordered association list of
/// `letter -> raw value string` parameters.
///
/// Values are kept as strings, interpreted numerically by consumers that
/// need them, so a line that round-trips through the pipeline untouched
/// reproduces its original text exactly. Insertion order is preserved: it is
/// irrelevant to readers, but preserving it keeps re-serialization stable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GCode {
    pub mnemonic: String,
    pub params: Vec<(char, String)>,
    pub comment: Option<String>,
}

impl GCode {
    pub fn new(mnemonic: impl Into<String>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            params: Vec::new(),
            comment: None,
        }
    }

    pub fn get(&self, letter: char) -> Option<&str> {
        self.params
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_f64(&self, letter: char) -> Option<f64> {
        self.get(letter).and_then(|v| v.parse::<f64>().ok())
    }

    /// Insert or overwrite a parameter, preserving the position of an
    /// existing one.
    pub fn set(&mut self, letter: char, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self.params.iter_mut().find(|(l, _)| *l == letter) {
            existing.1 = value;
        } else {
            self.params.push((letter, value));
        }
    }

    pub fn set_f64(&mut self, letter: char, value: f64) {
        self.set(letter, format_number(value));
    }

    pub fn remove(&mut self, letter: char) -> Option<String> {
        if let Some(pos) = self.params.iter().position(|(l, _)| *l == letter) {
            Some(self.params.remove(pos).1)
        } else {
            None
        }
    }

    pub fn with_param(mut self, letter: char, value: impl Into<String>) -> Self {
        self.set(letter, value);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Format a float the way the original slicer output does: fixed to five
/// decimal places (extrusion-advance precision), trailing zeros and a
/// trailing dot stripped.
pub fn format_number(value: f64) -> String {
    let mut s = format!("{:.5}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s.is_empty() || s == "-" {
        s = "0".to_string();
    }
    s
}

/// A `T<n>` line. `-1` means "no tool" in both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolChange {
    pub prev_tool: i32,
    pub next_tool: i32,
}

/// The recognised `;;`-prefixed marker labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamsLabel {
    TcTempInitialize,
    TcTempShutdown,
    BeforeLayerChange,
    AfterLayerChange,
    ToolBlockStart,
    ToolBlockEnd,
}

impl ParamsLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamsLabel::TcTempInitialize => "TC_TEMP_INITIALIZE",
            ParamsLabel::TcTempShutdown => "TC_TEMP_SHUTDOWN",
            ParamsLabel::BeforeLayerChange => "BEFORE_LAYER_CHANGE",
            ParamsLabel::AfterLayerChange => "AFTER_LAYER_CHANGE",
            ParamsLabel::ToolBlockStart => "TOOL_BLOCK_START",
            ParamsLabel::ToolBlockEnd => "TOOL_BLOCK_END",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "TC_TEMP_INITIALIZE" => ParamsLabel::TcTempInitialize,
            "TC_TEMP_SHUTDOWN" => ParamsLabel::TcTempShutdown,
            "BEFORE_LAYER_CHANGE" => ParamsLabel::BeforeLayerChange,
            "AFTER_LAYER_CHANGE" => ParamsLabel::AfterLayerChange,
            "TOOL_BLOCK_START" => ParamsLabel::ToolBlockStart,
            "TOOL_BLOCK_END" => ParamsLabel::ToolBlockEnd,
            _ => return None,
        })
    }

    /// Expected parameter arity for this label.
    pub fn expected_arity(&self) -> usize {
        match self {
            ParamsLabel::TcTempInitialize | ParamsLabel::TcTempShutdown => 0,
            ParamsLabel::BeforeLayerChange | ParamsLabel::AfterLayerChange => 2,
            ParamsLabel::ToolBlockStart | ParamsLabel::ToolBlockEnd => 1,
        }
    }
}

/// A structured `;;` marker comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub label: ParamsLabel,
    pub values: Vec<ParamValue>,
}

impl Params {
    pub fn new(label: ParamsLabel, values: Vec<ParamValue>) -> Self {
        Self { label, values }
    }

    pub fn layer_num(&self) -> Option<i64> {
        self.values.first().map(|v| v.as_i64())
    }

    pub fn layer_z(&self) -> Option<f64> {
        self.values.get(1).map(|v| v.as_f64())
    }

    pub fn tool_id(&self) -> Option<i32> {
        self.values.first().map(|v| v.as_i64() as i32)
    }
}

/// A plain `;` comment line, text excluding the leading `;`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
}

/// The four token variants the pipeline operates on.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    GCode(GCode),
    ToolChange(ToolChange),
    Params(Params),
    Comment(Comment),
}

impl TokenKind {
    pub fn as_gcode(&self) -> Option<&GCode> {
        match self {
            TokenKind::GCode(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_gcode_mut(&mut self) -> Option<&mut GCode> {
        match self {
            TokenKind::GCode(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_tool_change(&self) -> Option<&ToolChange> {
        match self {
            TokenKind::ToolChange(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_params(&self) -> Option<&Params> {
        match self {
            TokenKind::Params(p) => Some(p),
            _ => None,
        }
    }
}

/// An element of the ordered sequence.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub seq: Option<usize>,
    pub pre_state: Option<MachineState>,
    pub post_state: Option<MachineState>,
    pub runtime: f64,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            seq: None,
            pre_state: None,
            post_state: None,
            runtime: 0.0,
        }
    }
}

impl From<GCode> for Token {
    fn from(g: GCode) -> Self {
        Token::new(TokenKind::GCode(g))
    }
}

impl From<ToolChange> for Token {
    fn from(t: ToolChange) -> Self {
        Token::new(TokenKind::ToolChange(t))
    }
}

impl From<Params> for Token {
    fn from(p: Params) -> Self {
        Token::new(TokenKind::Params(p))
    }
}

impl From<Comment> for Token {
    fn from(c: Comment) -> Self {
        Token::new(TokenKind::Comment(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcode_set_preserves_existing_position() {
        let mut g = GCode::new("G1");
        g.set('X', "10");
        g.set('Y', "20");
        g.set('X', "15");
        assert_eq!(g.params, vec![('X', "15".to_string()), ('Y', "20".to_string())]);
    }

    #[test]
    fn format_number_strips_trailing_zeros() {
        assert_eq!(format_number(1.20000), "1.2");
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.00001), "-0.00001");
    }

    #[test]
    fn params_label_round_trips_through_str() {
        for label in [
            ParamsLabel::TcTempInitialize,
            ParamsLabel::TcTempShutdown,
            ParamsLabel::BeforeLayerChange,
            ParamsLabel::AfterLayerChange,
            ParamsLabel::ToolBlockStart,
            ParamsLabel::ToolBlockEnd,
        ] {
            assert_eq!(ParamsLabel::from_str(label.as_str()), Some(label));
        }
        assert_eq!(ParamsLabel::from_str("BOGUS"), None);
    }
}
