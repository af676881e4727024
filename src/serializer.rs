//! Rendering the finished token sequence back to G-code text. Grounded in
//! the original's `Block.render` word-joining style: one line per token,
//! mnemonic first, then its parameters in their stored order.

use crate::token::{TokenKind, TokenSequence};

pub fn serialize(seq: &TokenSequence) -> String {
    let mut out = String::new();
    for id in seq.iter_ids() {
        render_token(&mut out, &seq.get(id).kind);
        out.push('\n');
    }
    out
}

fn render_token(out: &mut String, kind: &TokenKind) {
    match kind {
        TokenKind::GCode(g) => {
            out.push_str(&g.mnemonic);
            for (letter, value) in &g.params {
                out.push(' ');
                out.push(*letter);
                out.push_str(value);
            }
            if let Some(comment) = &g.comment {
                out.push_str(" ;");
                out.push_str(comment);
            }
        }
        TokenKind::ToolChange(tc) => {
            out.push('T');
            out.push_str(&tc.next_tool.to_string());
            out.push_str(" ; T");
            out.push_str(&tc.prev_tool.to_string());
            out.push_str(" -> T");
            out.push_str(&tc.next_tool.to_string());
        }
        TokenKind::Comment(c) => {
            out.push(';');
            out.push_str(&c.text);
        }
        TokenKind::Params(p) => {
            out.push_str(";;");
            out.push_str(p.label.as_str());
            if !p.values.is_empty() {
                out.push(':');
                let rendered: Vec<String> = p
                    .values
                    .iter()
                    .map(|v| match v {
                        crate::token::ParamValue::Int(i) => i.to_string(),
                        crate::token::ParamValue::Float(f) => crate::token::format_number(*f),
                    })
                    .collect();
                out.push_str(&rendered.join(","));
            }
        }
    }
}
