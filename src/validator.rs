//! The validator/fixer pass: a single forward walk that removes forbidden
//! mnemonics, rescales fan speed, patches missing `G10` `P` parameters, and
//! synthesises a default tool change when the input never selects one.
//! Grounded in the original's `GCodeValidator.analyze_and_fix`.

use tracing::warn;

use crate::token::{ParamsLabel, ToolChange, TokenSequence};

/// Mnemonics the planners re-emit themselves; any slicer-authored copy is
/// stripped so there is exactly one source of truth for these commands.
const REMOVABLE: &[&str] = &["M104", "M109", "M900", "M140", "M190"];

/// Run the validator/fixer pass in place.
pub fn validate_and_fix(seq: &mut TokenSequence) {
    remove_forbidden_codes(seq);
    rescale_fan_speed(seq);
    patch_g10_missing_p(seq);
    inject_default_tool_if_absent(seq);
}

fn remove_forbidden_codes(seq: &mut TokenSequence) {
    let to_remove: Vec<_> = seq
        .iter_ids()
        .filter(|&id| {
            seq.get(id)
                .kind
                .as_gcode()
                .map(|g| REMOVABLE.contains(&g.mnemonic.as_str()))
                .unwrap_or(false)
        })
        .collect();
    for id in to_remove {
        seq.remove(id);
    }
}

/// Fan speed arrives from the slicer in `0..255`; downstream consumers want
/// `0..1`. Only rescales values still in the raw range, so a second pass
/// over already-rescaled output is a no-op rather than dividing twice.
fn rescale_fan_speed(seq: &mut TokenSequence) {
    let ids: Vec<_> = seq.iter_ids().collect();
    for id in ids {
        let token = seq.get_mut(id);
        if let Some(g) = token.kind.as_gcode_mut() {
            if g.mnemonic == "M106" {
                if let Some(s) = g.get_f64('S') {
                    if s > 1.0 {
                        g.set_f64('S', s / 255.0);
                    }
                }
            }
        }
    }
}

fn patch_g10_missing_p(seq: &mut TokenSequence) {
    let ids: Vec<_> = seq.iter_ids().collect();
    for id in ids {
        let token = seq.get_mut(id);
        if let Some(g) = token.kind.as_gcode_mut() {
            if g.mnemonic == "G10" && g.get('P').is_none() && (g.get('S').is_some() || g.get('R').is_some()) {
                g.set('P', "0");
                warn!("G10 with temperature form but no P parameter; injected P=0");
            }
        }
    }
}

fn inject_default_tool_if_absent(seq: &mut TokenSequence) {
    let has_real_tool_change = seq.iter_ids().any(|id| {
        seq.get(id)
            .kind
            .as_tool_change()
            .map(|tc| tc.next_tool >= 0)
            .unwrap_or(false)
    });
    if has_real_tool_change {
        return;
    }

    let first_before_layer_change = seq.iter_ids().find(|&id| {
        matches!(
            seq.get(id).kind.as_params(),
            Some(p) if p.label == ParamsLabel::BeforeLayerChange
        )
    });

    if let Some(anchor) = first_before_layer_change {
        seq.insert_before(
            anchor,
            ToolChange {
                prev_tool: -1,
                next_tool: 0,
            },
        );
        warn!("no tool selection found in input; synthesised T0 before the first layer change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::token::TokenKind;

    #[test]
    fn removes_forbidden_mnemonics() {
        let mut seq = parse("M104 S200\nG1 X1\nM140 S60\n").unwrap();
        validate_and_fix(&mut seq);
        assert_eq!(seq.len(), 1);
        assert!(matches!(seq.get(seq.head().unwrap()).kind, TokenKind::GCode(_)));
    }

    #[test]
    fn rescales_m106_fan_speed() {
        let mut seq = parse("M106 S255\n").unwrap();
        validate_and_fix(&mut seq);
        let g = seq.get(seq.head().unwrap()).kind.as_gcode().unwrap();
        assert_eq!(g.get_f64('S'), Some(1.0));
    }

    #[test]
    fn injects_p0_on_g10_temperature_form() {
        let mut seq = parse("G10 S210\n").unwrap();
        validate_and_fix(&mut seq);
        let g = seq.get(seq.head().unwrap()).kind.as_gcode().unwrap();
        assert_eq!(g.get('P'), Some("0"));
    }

    #[test]
    fn does_not_touch_firmware_retract_g10() {
        let mut seq = parse("G10\n").unwrap();
        validate_and_fix(&mut seq);
        let g = seq.get(seq.head().unwrap()).kind.as_gcode().unwrap();
        assert_eq!(g.get('P'), None);
    }

    #[test]
    fn synthesises_default_tool_before_first_before_layer_change() {
        let mut seq = parse(";;BEFORE_LAYER_CHANGE:0,0.2\nG1 X1\n").unwrap();
        validate_and_fix(&mut seq);
        let first = seq.get(seq.head().unwrap());
        assert!(matches!(first.kind, TokenKind::ToolChange(tc) if tc.next_tool == 0));
    }

    #[test]
    fn leaves_existing_tool_selection_alone() {
        let mut seq = parse("T2\n;;BEFORE_LAYER_CHANGE:0,0.2\n").unwrap();
        validate_and_fix(&mut seq);
        let first = seq.get(seq.head().unwrap());
        assert!(matches!(first.kind, TokenKind::ToolChange(tc) if tc.next_tool == 2));
    }

    #[test]
    fn validator_is_idempotent() {
        let mut seq = parse("M104 S200\nM106 S255\nG10 S210\nG1 X1\n").unwrap();
        validate_and_fix(&mut seq);
        let once = seq
            .iter_ids()
            .map(|id| format!("{:?}", seq.get(id).kind))
            .collect::<Vec<_>>();
        validate_and_fix(&mut seq);
        let twice = seq
            .iter_ids()
            .map(|id| format!("{:?}", seq.get(id).kind))
            .collect::<Vec<_>>();
        assert_eq!(once, twice);
    }
}
