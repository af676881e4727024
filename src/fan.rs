//! The fan planner: silence the part-cooling fan across every tool change,
//! then restore it once the new tool has cleared its configured
//! first-layers hold-off. Grounded in the original's `FanController`.

use crate::config::Config;
use crate::token::{format_number, GCode, ParamsLabel, TokenKind, TokenSequence};

/// Insert `M106 S0` before every real tool change, and `M106 S<speed>`
/// after it once the layer the change lands on is past that tool's
/// `disable_fan_first_layers` hold-off.
pub fn plan_fan(seq: &mut TokenSequence, config: &Config) {
    let mut layer_num = 0i64;
    let mut ids: Vec<_> = seq.iter_ids().collect();
    // Collect first: insertions below must not shift the ids we still need
    // to visit, since `iter_ids` walks live links and an insert_before on
    // an upcoming id would otherwise be seen twice.
    let mut to_silence = Vec::new();
    let mut to_restore = Vec::new();

    for id in ids.drain(..) {
        let token = seq.get(id);
        match &token.kind {
            TokenKind::Params(p) if p.label == ParamsLabel::AfterLayerChange => {
                layer_num = p.layer_num().unwrap_or(layer_num);
            }
            TokenKind::ToolChange(tc) if tc.next_tool >= 0 => {
                to_silence.push(id);
                let tool = tc.next_tool as usize;
                if layer_num > config.disable_fan_first_layers[tool] {
                    to_restore.push((id, tc.next_tool));
                }
            }
            _ => {}
        }
    }

    for id in to_silence {
        seq.insert_before(id, fan_off_token());
    }
    for (id, tool) in to_restore {
        let speed = config.max_fan_speed[tool as usize];
        seq.insert_after(id, fan_speed_token(speed));
    }
}

fn fan_off_token() -> crate::token::Token {
    GCode::new("M106").with_param('S', "0").into()
}

fn fan_speed_token(speed: f64) -> crate::token::Token {
    GCode::new("M106").with_param('S', format_number(speed)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::parser::parse;
    use crate::state::analyze;

    fn fan_speeds(seq: &TokenSequence) -> Vec<f64> {
        seq.iter_ids()
            .filter_map(|id| seq.get(id).kind.as_gcode())
            .filter(|g| g.mnemonic == "M106")
            .map(|g| g.get_f64('S').unwrap())
            .collect()
    }

    #[test]
    fn tool_change_is_bracketed_by_fan_off_then_restore() {
        let mut seq = parse(";;AFTER_LAYER_CHANGE:5,1.0\nT0\nG1 X1 E1\n").unwrap();
        let config = test_config();
        analyze(&mut seq, &config).unwrap();
        plan_fan(&mut seq, &config);
        let speeds = fan_speeds(&seq);
        assert_eq!(speeds.first(), Some(&0.0));
        assert!(speeds.len() >= 2);
        assert!(speeds[1] > 0.0);
    }

    #[test]
    fn first_layers_hold_off_suppresses_restore() {
        let mut seq = parse(";;AFTER_LAYER_CHANGE:0,0.2\nT0\nG1 X1 E1\n").unwrap();
        let mut config = test_config();
        config.disable_fan_first_layers = vec![3, 3, 3];
        analyze(&mut seq, &config).unwrap();
        plan_fan(&mut seq, &config);
        let speeds = fan_speeds(&seq);
        assert_eq!(speeds, vec![0.0]);
    }
}
