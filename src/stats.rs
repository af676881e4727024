//! Final bookkeeping pass: rewrite the slicer's own filament-usage and
//! print-time comments with the totals the analyser actually measured.
//! Grounded in the original's `GCodeAnalyzer.update_statistics`.

use std::collections::HashMap;

use crate::config::Config;
use crate::state::AnalysisResult;
use crate::token::{TokenKind, TokenSequence};

/// Format a total-runtime figure in seconds as `HhMmSs`, matching the
/// original's `total_runtime_str` property.
pub fn format_runtime(total_runtime: f64) -> String {
    let mut runtime_s = total_runtime as i64;
    let h = runtime_s / 3600;
    runtime_s -= h * 3600;
    let m = runtime_s / 60;
    let s = runtime_s - m * 60;
    format!("{h}h{m}m{s}s")
}

fn filament_lines(config: &Config, totals: &HashMap<i32, f64>) -> (String, String, String) {
    let mut tools: Vec<i32> = totals.keys().copied().collect();
    tools.sort_unstable();
    if !totals.contains_key(&0) {
        tools.insert(0, 0);
    }

    let mut mm = Vec::new();
    let mut cm3 = Vec::new();
    let mut g = Vec::new();
    for tool in tools {
        let used_mm = totals.get(&tool).copied().unwrap_or(0.0);
        let i = tool as usize;
        let used_cm3 = used_mm * config.filament_diameter[i] * 0.001;
        let used_g = used_cm3 * config.filament_density[i];
        mm.push(format!("{used_mm:.2}"));
        cm3.push(format!("{used_cm3:.2}"));
        g.push(format!("{used_g:.2}"));
    }

    (mm.join(","), cm3.join(","), g.join(","))
}

/// Overwrite the slicer's `filament used [mm]/[cm3]/[g]` and
/// `estimated printing time (normal mode)` comments with the totals from
/// the final analyser pass. Any other comment is left untouched.
pub fn rewrite_statistics(seq: &mut TokenSequence, config: &Config, totals: &AnalysisResult) {
    let (mm, cm3, g) = filament_lines(config, &totals.total_filament_usage);
    let runtime_str = format_runtime(totals.total_runtime);

    let ids: Vec<_> = seq.iter_ids().collect();
    for id in ids {
        let token = seq.get_mut(id);
        let TokenKind::Comment(comment) = &mut token.kind else {
            continue;
        };
        if comment.text.contains("filament used [mm]") {
            comment.text = format!("filament used [mm] = {mm}");
        } else if comment.text.contains("filament used [cm3]") {
            comment.text = format!("filament used [cm3] = {cm3}");
        } else if comment.text.contains("filament used [g]") {
            comment.text = format!("filament used [g] = {g}");
        } else if comment.text.contains("estimated printing time (normal mode)") {
            comment.text = format!("estimated printing time (normal mode) = {runtime_str}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::parser::parse;

    #[test]
    fn format_runtime_splits_hours_minutes_seconds() {
        assert_eq!(format_runtime(3725.0), "1h2m5s");
        assert_eq!(format_runtime(59.0), "0h0m59s");
    }

    #[test]
    fn rewrites_matching_comments_and_leaves_others_alone() {
        let mut seq = parse(
            "; filament used [mm] = 0.00\n\
             ; filament used [cm3] = 0.00\n\
             ; filament used [g] = 0.00\n\
             ; estimated printing time (normal mode) = 0h0m0s\n\
             ; some unrelated note\n",
        )
        .unwrap();
        let config = test_config();
        let mut totals = AnalysisResult::default();
        totals.total_runtime = 65.0;
        totals.total_filament_usage.insert(0, 12.5);

        rewrite_statistics(&mut seq, &config, &totals);

        let texts: Vec<String> = seq
            .iter_ids()
            .map(|id| match &seq.get(id).kind {
                TokenKind::Comment(c) => c.text.clone(),
                _ => String::new(),
            })
            .collect();
        assert!(texts[0].contains("12.50"));
        assert!(texts[3].contains("0h1m5s"));
        assert_eq!(texts[4], "some unrelated note");
    }
}
