//! The line-oriented lexer/parser, grounded in the original's
//! `GCodeAnalyzer.parse`: split the incoming text into lines, classify each
//! trimmed non-empty line by its leading character, and push a token.
//!
//! The parser performs no semantic checks beyond marker-label lookup and
//! arity/type validation of `;;` parameters — everything else (whether a
//! `ToolChange` makes sense, whether axis values are sane) is the
//! validator's and analyser's job.

use crate::error::ParseError;
use crate::token::{Comment, GCode, ParamValue, Params, ParamsLabel, ToolChange, TokenSequence};

/// Parse a complete G-code text file into a fresh token sequence.
pub fn parse(text: &str) -> Result<TokenSequence, ParseError> {
    let mut seq = TokenSequence::new();
    let mut last_tool: i32 = -1;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(";;") {
            seq.append(parse_params(line_no, rest)?);
        } else if let Some(rest) = line.strip_prefix(';') {
            seq.append(Comment {
                text: rest.trim().to_string(),
            });
        } else if line.starts_with('G') || line.starts_with('M') {
            seq.append(parse_gcode(line));
        } else if line.starts_with('T') {
            let mut tc = parse_tool_change(line_no, line)?;
            tc.prev_tool = last_tool;
            last_tool = tc.next_tool;
            seq.append(tc);
        } else {
            // Unrecognised line kind: silently ignored.
            continue;
        }
    }

    Ok(seq)
}

fn parse_params(line_no: usize, rest: &str) -> Result<Params, ParseError> {
    let (label_str, values_str) = match rest.split_once(':') {
        Some((l, v)) => (l.trim(), Some(v)),
        None => (rest.trim(), None),
    };

    let label = ParamsLabel::from_str(label_str).ok_or_else(|| ParseError::UnknownLabel {
        line: line_no,
        label: label_str.to_string(),
    })?;

    let raw_values: Vec<&str> = match values_str {
        Some(v) if !v.trim().is_empty() => v.split(',').map(|s| s.trim()).collect(),
        _ => Vec::new(),
    };

    let expected = label.expected_arity();
    if raw_values.len() != expected {
        return Err(ParseError::WrongArity {
            line: line_no,
            label: label_str.to_string(),
            expected,
            got: raw_values.len(),
        });
    }

    let mut values = Vec::with_capacity(raw_values.len());
    for (i, raw) in raw_values.iter().enumerate() {
        values.push(parse_param_value(line_no, label, i, raw)?);
    }

    Ok(Params::new(label, values))
}

fn parse_param_value(
    line_no: usize,
    label: ParamsLabel,
    idx: usize,
    raw: &str,
) -> Result<ParamValue, ParseError> {
    let is_int = match label {
        ParamsLabel::BeforeLayerChange | ParamsLabel::AfterLayerChange => idx == 0,
        ParamsLabel::ToolBlockStart | ParamsLabel::ToolBlockEnd => true,
        ParamsLabel::TcTempInitialize | ParamsLabel::TcTempShutdown => {
            unreachable!("these labels take no parameters")
        }
    };

    let bad = || ParseError::BadParamValue {
        line: line_no,
        label: label.as_str().to_string(),
        value: raw.to_string(),
    };

    if is_int {
        raw.parse::<i64>().map(ParamValue::Int).map_err(|_| bad())
    } else {
        raw.parse::<f64>().map(ParamValue::Float).map_err(|_| bad())
    }
}

fn parse_gcode(line: &str) -> GCode {
    let (code_part, comment) = match line.find(';') {
        Some(pos) => (&line[..pos], Some(line[pos + 1..].trim().to_string())),
        None => (line, None),
    };

    let mut words = code_part.split_whitespace();
    let mnemonic = words.next().unwrap_or_default().to_string();
    let mut gcode = GCode {
        mnemonic,
        params: Vec::new(),
        comment,
    };

    for word in words {
        let mut chars = word.chars();
        if let Some(letter) = chars.next() {
            gcode.set(letter.to_ascii_uppercase(), chars.as_str().to_string());
        }
    }

    gcode
}

fn parse_tool_change(line_no: usize, line: &str) -> Result<ToolChange, ParseError> {
    let digits = &line[1..];
    let next_tool = digits
        .trim()
        .parse::<i32>()
        .map_err(|_| ParseError::BadToolChange {
            line: line_no,
            text: line.to_string(),
        })?;
    Ok(ToolChange {
        prev_tool: -1, // filled in by parse() below using running state
        next_tool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn parses_gcode_with_params_and_inline_comment() {
        let seq = parse("G1 X10 Y-5.5 F1200 ; move\n").unwrap();
        let tok = seq.get(seq.head().unwrap());
        match &tok.kind {
            TokenKind::GCode(g) => {
                assert_eq!(g.mnemonic, "G1");
                assert_eq!(g.get('X'), Some("10"));
                assert_eq!(g.get('Y'), Some("-5.5"));
                assert_eq!(g.get('F'), Some("1200"));
                assert_eq!(g.comment.as_deref(), Some("move"));
            }
            _ => panic!("expected GCode"),
        }
    }

    #[test]
    fn parses_plain_comment() {
        let seq = parse("; just a note\n").unwrap();
        let tok = seq.get(seq.head().unwrap());
        match &tok.kind {
            TokenKind::Comment(c) => assert_eq!(c.text, "just a note"),
            _ => panic!("expected Comment"),
        }
    }

    #[test]
    fn parses_params_marker_with_values() {
        let seq = parse(";;AFTER_LAYER_CHANGE:3,1.5\n").unwrap();
        let tok = seq.get(seq.head().unwrap());
        match &tok.kind {
            TokenKind::Params(p) => {
                assert_eq!(p.label, ParamsLabel::AfterLayerChange);
                assert_eq!(p.layer_num(), Some(3));
                assert_eq!(p.layer_z(), Some(1.5));
            }
            _ => panic!("expected Params"),
        }
    }

    #[test]
    fn parses_no_arg_marker() {
        let seq = parse(";;TC_TEMP_INITIALIZE\n").unwrap();
        let tok = seq.get(seq.head().unwrap());
        match &tok.kind {
            TokenKind::Params(p) => {
                assert_eq!(p.label, ParamsLabel::TcTempInitialize);
                assert!(p.values.is_empty());
            }
            _ => panic!("expected Params"),
        }
    }

    #[test]
    fn rejects_unknown_label() {
        let err = parse(";;BOGUS_MARKER\n").unwrap_err();
        assert!(matches!(err, ParseError::UnknownLabel { line: 1, .. }));
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = parse(";;AFTER_LAYER_CHANGE:3\n").unwrap_err();
        assert!(matches!(err, ParseError::WrongArity { line: 1, expected: 2, got: 1, .. }));
    }

    #[test]
    fn parses_tool_change_and_chains_prev_tool() {
        let seq = parse("T0\nT1\nT-1\n").unwrap();
        let ids: Vec<_> = seq.iter_ids().collect();
        let changes: Vec<_> = ids
            .iter()
            .map(|id| match &seq.get(*id).kind {
                TokenKind::ToolChange(tc) => *tc,
                _ => panic!("expected ToolChange"),
            })
            .collect();
        assert_eq!(changes[0], crate::token::ToolChange { prev_tool: -1, next_tool: 0 });
        assert_eq!(changes[1], crate::token::ToolChange { prev_tool: 0, next_tool: 1 });
        assert_eq!(changes[2], crate::token::ToolChange { prev_tool: 1, next_tool: -1 });
    }

    #[test]
    fn ignores_unrecognised_lines() {
        let seq = parse("this is garbage\n\nG1 X1\n").unwrap();
        assert_eq!(seq.len(), 1);
    }
}
