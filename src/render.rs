use std::fmt::Write as _;

use crate::types::{DailyPlan, Pattern, Width};

const MAX_WIDTH: f64 = 80.0;
const BAR_HEIGHT: usize = 4;
const WASTE: char = '.';

/// Draws a pattern as strips laid side by side across the parent width,
/// with trailing waste shaded.
pub fn render_pattern(pattern: &Pattern, parent_width: Width) -> String {
    let parent = parent_width.mm();
    if parent <= 0.0 {
        return String::new();
    }
    let scale = MAX_WIDTH / parent;
    let grid_w = (parent * scale).round() as usize;
    let grid_h = BAR_HEIGHT;

    let mut grid = vec![vec![' '; grid_w + 1]; grid_h + 1];
    draw_rect(&mut grid, 0, 0, grid_w, grid_h);

    let mut offset = 0.0;
    for cut in &pattern.cuts {
        let width = cut.width.mm();
        for _ in 0..cut.count {
            let sx = (offset * scale).round() as usize;
            let ex = ((offset + width) * scale).round() as usize;
            offset += width;
            let sw = ex.saturating_sub(sx);
            if sw == 0 {
                continue;
            }
            draw_rect(&mut grid, sx, 0, sw, grid_h);
            label(&mut grid, sx, sw, &cut.width.to_string());
        }
    }

    let waste_start = (offset * scale).round() as usize;
    for row in grid.iter_mut().take(grid_h).skip(1) {
        for cell in row.iter_mut().take(grid_w).skip(waste_start + 1) {
            if *cell == ' ' {
                *cell = WASTE;
            }
        }
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

fn label(grid: &mut [Vec<char>], sx: usize, sw: usize, text: &str) {
    let chars: Vec<char> = text.chars().collect();
    if sw <= chars.len() + 1 {
        return;
    }
    let cy = grid.len() / 2;
    let start = (sx + sw / 2).saturating_sub(chars.len() / 2);
    for (i, &ch) in chars.iter().enumerate() {
        let x = start + i;
        if x > sx && x < sx + sw {
            grid[cy][x] = ch;
        }
    }
}

#[allow(clippy::needless_range_loop)]
fn draw_rect(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    let rows = grid.len();
    let cols = if rows > 0 { grid[0].len() } else { return };

    for i in x..=x + w {
        if i < cols {
            for j in [y, y + h] {
                if j < rows {
                    grid[j][i] = if matches!(grid[j][i], '|' | '+') { '+' } else { '-' };
                }
            }
        }
    }

    for j in y..=y + h {
        if j < rows {
            for i in [x, x + w] {
                if i < cols {
                    grid[j][i] = if matches!(grid[j][i], '-' | '+') { '+' } else { '|' };
                }
            }
        }
    }

    for cx in [x, x + w] {
        for cy in [y, y + h] {
            if cy < rows && cx < cols {
                grid[cy][cx] = '+';
            }
        }
    }
}

/// Plain-text production calendar, one line per day.
pub fn render_schedule(days: &[DailyPlan]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:>5} {:>8} {:>7} {:>6} {:>7}  patterns",
        "date", "units", "tons", "setup", "cap%", "yield%"
    );
    for day in days {
        let patterns: Vec<String> = day
            .patterns
            .iter()
            .map(|p| format!("{}#{}x{}", p.coil_code, p.pattern_id, p.units))
            .collect();
        let _ = writeln!(
            out,
            "{:<14} {:>5} {:>8.1} {:>7.1} {:>6.0} {:>7.1}  {}{}",
            day.date.format("%Y-%m-%d %a").to_string(),
            day.unit_count(),
            day.total_tons,
            day.setup_penalty_tons,
            day.capacity_used_percent,
            day.daily_yield,
            patterns.join(" "),
            if day.overloaded { "  OVERLOADED" } else { "" },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cut, ScheduledPattern};
    use chrono::NaiveDate;

    fn pattern(cuts: &[(f64, u32)], parent: f64) -> Pattern {
        let cuts: Vec<Cut> = cuts
            .iter()
            .map(|&(w, count)| Cut {
                width: Width::from_mm(w),
                count,
                weight_per_cut: w / parent * 10.0,
            })
            .collect();
        let used: Width = cuts.iter().map(|c| c.width.times(c.count)).sum();
        Pattern {
            id: 1,
            cuts,
            assigned_units: 3.0,
            used_width: used,
            waste_width: Width::from_mm(parent) - used,
            yield_percent: used.mm() / parent * 100.0,
            total_production_weight: 30.0,
        }
    }

    #[test]
    fn test_render_full_width_strips() {
        let output = render_pattern(&pattern(&[(600.0, 2)], 1200.0), Width::from_mm(1200.0));
        assert!(output.contains('+'));
        assert!(output.contains('-'));
        assert!(output.contains('|'));
        assert_eq!(output.matches("600").count(), 2);
        assert!(!output.contains(WASTE));
    }

    #[test]
    fn test_render_shades_waste() {
        let output = render_pattern(&pattern(&[(500.0, 1), (300.0, 1)], 1210.0), Width::from_mm(1210.0));
        assert!(output.contains("500"));
        assert!(output.contains("300"));
        assert!(output.contains(WASTE));
    }

    #[test]
    fn test_render_empty_pattern() {
        let output = render_pattern(&pattern(&[], 1200.0), Width::from_mm(1200.0));
        // Border only, interior all waste
        assert!(output.contains('+'));
        assert!(output.contains(WASTE));
        assert_eq!(render_pattern(&pattern(&[], 1200.0), Width::ZERO), "");
    }

    #[test]
    fn test_render_schedule_table() {
        let p = pattern(&[(600.0, 2)], 1200.0);
        let day = DailyPlan {
            date: NaiveDate::from_ymd_opt(2026, 11, 8).unwrap(),
            patterns: vec![ScheduledPattern {
                pattern_id: 1,
                units: 2,
                pattern: p,
                coil_code: "100436".into(),
                coil_description: String::new(),
            }],
            total_tons: 20.0,
            daily_yield: 100.0,
            produced_items: Vec::new(),
            capacity_used_percent: 200.0,
            setup_penalty_tons: 10.0,
            capacity_tons: 15.0,
            overloaded: true,
        };
        let table = render_schedule(&[day]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("2026-11-08 Sun"));
        assert!(lines[1].contains("100436#1x2"));
        assert!(lines[1].ends_with("OVERLOADED"));
    }
}
