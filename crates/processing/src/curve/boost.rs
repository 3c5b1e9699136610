//! Peak/low amplification with plateau breaking.

/// Inclusive index ranges of runs of at least two equal values.
pub fn find_plateaus(values: &[f64]) -> Vec<(usize, usize)> {
    let mut plateaus = Vec::new();
    let mut start = 0;
    for i in 1..values.len() {
        if values[i] != values[i - 1] {
            if i - start > 1 {
                plateaus.push((start, i - 1));
            }
            start = i;
        }
    }
    if values.len().saturating_sub(start) > 1 {
        plateaus.push((start, values.len() - 1));
    }
    plateaus
}

fn is_rail(value: f64) -> bool {
    value == 0.0 || value == 100.0
}

/// Push strict local maxima up by `up` and minima down by `down`, clamped to
/// the rails, then break 0/100 runs that boosting created and that are longer
/// than `max_flat_length`.
pub fn boost_extrema(values: &mut [f64], up: f64, down: f64, max_flat_length: usize) {
    let n = values.len();
    if n < 3 {
        return;
    }

    let original = find_plateaus(values);
    let peaks: Vec<usize> = (1..n - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] > values[i + 1])
        .collect();
    let lows: Vec<usize> = (1..n - 1)
        .filter(|&i| values[i] < values[i - 1] && values[i] < values[i + 1])
        .collect();

    for i in peaks {
        values[i] = (values[i] + up).clamp(0.0, 100.0);
    }
    for i in lows {
        values[i] = (values[i] - down).clamp(0.0, 100.0);
    }

    break_new_rail_runs(values, &original, max_flat_length);
}

/// Nudge every second point of each rail run longer than `max_flat_length`
/// one step off the rail, leaving runs listed in `original` alone. Afterwards
/// no new rail run holds more than one point.
fn break_new_rail_runs(values: &mut [f64], original: &[(usize, usize)], max_flat_length: usize) {
    for (start, end) in find_plateaus(values) {
        let value = values[start];
        if !is_rail(value) || end - start + 1 <= max_flat_length {
            continue;
        }
        let preexisting = original.iter().any(|&(s, e)| start >= s && end <= e);
        if preexisting {
            continue;
        }
        let inward = if value == 100.0 { -1.0 } else { 1.0 };
        for i in (start + 1..=end).step_by(2) {
            values[i] += inward;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longest_rail_run(values: &[f64]) -> usize {
        find_plateaus(values)
            .into_iter()
            .filter(|&(s, _)| is_rail(values[s]))
            .map(|(s, e)| e - s + 1)
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_plateaus() {
        let values = [1.0, 1.0, 2.0, 3.0, 3.0, 3.0, 4.0];
        assert_eq!(find_plateaus(&values), vec![(0, 1), (3, 5)]);
        assert_eq!(find_plateaus(&[5.0, 5.0]), vec![(0, 1)]);
        assert!(find_plateaus(&[1.0, 2.0, 3.0]).is_empty());
    }

    #[test]
    fn test_extrema_are_boosted() {
        let mut values = vec![50.0, 80.0, 50.0, 20.0, 50.0];
        boost_extrema(&mut values, 10.0, 15.0, 5);
        assert_eq!(values, vec![50.0, 90.0, 50.0, 5.0, 50.0]);
    }

    #[test]
    fn test_boost_clamps_to_rails() {
        let mut values = vec![50.0, 95.0, 50.0, 5.0, 50.0];
        boost_extrema(&mut values, 10.0, 15.0, 5);
        assert_eq!(values, vec![50.0, 100.0, 50.0, 0.0, 50.0]);
    }

    #[test]
    fn test_existing_rail_plateau_is_kept() {
        let mut values = vec![50.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 50.0];
        let before = longest_rail_run(&values);
        boost_extrema(&mut values, 10.0, 15.0, 3);
        assert_eq!(longest_rail_run(&values), before);
    }

    #[test]
    fn test_boosted_peaks_do_not_form_runs() {
        let mut values = vec![50.0, 95.0, 92.0, 96.0, 93.0, 97.0, 91.0, 98.0, 50.0];
        boost_extrema(&mut values, 10.0, 15.0, 1);
        assert_eq!(values[1], 100.0);
        assert_eq!(values[3], 100.0);
        assert!(longest_rail_run(&values) <= 1);
    }

    #[test]
    fn test_short_rail_runs_are_broken() {
        let mut pair = vec![50.0, 100.0, 100.0, 50.0];
        break_new_rail_runs(&mut pair, &[], 1);
        assert_eq!(pair, vec![50.0, 100.0, 99.0, 50.0]);

        let mut even = vec![50.0, 0.0, 0.0, 0.0, 0.0, 50.0];
        break_new_rail_runs(&mut even, &[], 0);
        assert_eq!(even, vec![50.0, 0.0, 1.0, 0.0, 1.0, 50.0]);
        assert_eq!(longest_rail_run(&even), 1);

        let mut odd = vec![100.0; 5];
        break_new_rail_runs(&mut odd, &[], 2);
        assert_eq!(odd, vec![100.0, 99.0, 100.0, 99.0, 100.0]);
    }

    #[test]
    fn test_breaking_skips_runs_that_already_existed() {
        let mut values = vec![50.0, 100.0, 100.0, 50.0];
        break_new_rail_runs(&mut values, &[(1, 2)], 0);
        assert_eq!(values, vec![50.0, 100.0, 100.0, 50.0]);
    }

    #[test]
    fn test_short_series_unchanged() {
        let mut values = vec![10.0, 90.0];
        boost_extrema(&mut values, 10.0, 15.0, 5);
        assert_eq!(values, vec![10.0, 90.0]);
    }
}
