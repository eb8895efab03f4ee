//! Threshold-crossing peak detector for line profiles.
//!
//! A peak opens where the profile rises to `>= threshold` (provided the
//! last accepted peak closed at least `min_distance` samples earlier) and
//! closes at the next sample below threshold. Peaks narrower than
//! `min_width` samples are discarded. Positions are the normalised
//! midpoints `((open + close - 1) / 2) / len`, ascending.

/// Profiles shorter than this never contain a peak.
const MIN_PROFILE_LEN: usize = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakDetection {
    pub count: usize,
    /// Normalised (0..1) midpoints along the profile.
    pub positions: Vec<f64>,
}

/// Pure and deterministic: identical arguments give identical output.
pub fn detect_peaks(
    profile: &[f64],
    threshold: f64,
    min_width: usize,
    min_distance: usize,
) -> PeakDetection {
    let len = profile.len();
    if len < MIN_PROFILE_LEN {
        return PeakDetection::default();
    }

    let mut positions = Vec::new();
    let mut open: Option<usize> = None;
    let mut last_close: Option<usize> = None;

    for (i, &value) in profile.iter().enumerate() {
        match open {
            None => {
                let far_enough = last_close.map_or(true, |close| i - close >= min_distance);
                if value >= threshold && far_enough {
                    open = Some(i);
                }
            }
            Some(start) => {
                if value < threshold {
                    if let Some(position) = accept(start, i, len, min_width) {
                        positions.push(position);
                        last_close = Some(i);
                    }
                    open = None;
                }
            }
        }
    }

    if let Some(start) = open {
        if let Some(position) = accept(start, len, len, min_width) {
            positions.push(position);
        }
    }

    PeakDetection {
        count: positions.len(),
        positions,
    }
}

fn accept(start: usize, close: usize, len: usize, min_width: usize) -> Option<f64> {
    if close - start < min_width {
        return None;
    }
    Some(((start + close - 1) as f64 / 2.0) / len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `width`-sample plateaus of 200 at the given starts, 0 elsewhere.
    fn plateaus(len: usize, starts: &[usize], width: usize) -> Vec<f64> {
        let mut profile = vec![0.0; len];
        for &s in starts {
            for v in &mut profile[s..s + width] {
                *v = 200.0;
            }
        }
        profile
    }

    #[test]
    fn repeated_calls_are_identical() {
        let profile = plateaus(40, &[3, 15, 30], 4);
        let a = detect_peaks(&profile, 128.0, 2, 3);
        let b = detect_peaks(&profile, 128.0, 2, 3);
        assert_eq!(a, b);
        assert_eq!(a.count, 3);
    }

    #[test]
    fn all_zero_profile_has_no_peaks() {
        assert_eq!(detect_peaks(&[0.0, 0.0, 0.0], 1.0, 1, 1), PeakDetection::default());
    }

    #[test]
    fn short_profile_has_no_peaks() {
        assert_eq!(detect_peaks(&[255.0, 255.0], 1.0, 1, 0).count, 0);
        assert_eq!(detect_peaks(&[], 1.0, 1, 0).count, 0);
    }

    #[test]
    fn full_plateau_is_one_peak_at_its_midpoint() {
        let result = detect_peaks(&[5.0; 5], 5.0, 2, 0);
        assert_eq!(result.count, 1);
        assert_eq!(result.positions, vec![0.4]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let result = detect_peaks(&[0.0, 128.0, 128.0, 0.0], 128.0, 2, 0);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn separated_peaks_counted_separately() {
        // closes at 5, reopens at 15: distance 10
        let profile = plateaus(25, &[2, 15], 3);
        let result = detect_peaks(&profile, 128.0, 2, 10);
        assert_eq!(result.count, 2);
        assert_eq!(result.positions, vec![3.0 / 25.0, 16.0 / 25.0]);
    }

    /// Peak on [0, 3), gap on [3, 5), second plateau on [5, 10).
    fn near_pair() -> Vec<f64> {
        let mut profile = vec![0.0; 14];
        for i in (0..3).chain(5..10) {
            profile[i] = 200.0;
        }
        profile
    }

    #[test]
    fn close_peak_opening_is_delayed_until_distance_met() {
        let result = detect_peaks(&near_pair(), 128.0, 2, 5);
        // second peak may only open at index 8 (3 + 5) and closes at 10
        assert_eq!(result.count, 2);
        assert_eq!(result.positions[1], ((8 + 10 - 1) as f64 / 2.0) / 14.0);
    }

    #[test]
    fn delayed_peak_too_narrow_is_dropped() {
        let result = detect_peaks(&near_pair(), 128.0, 3, 5);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn narrow_peaks_rejected_and_do_not_block() {
        // 1-sample spike at 2 (rejected), real peak at [4, 7)
        let mut profile = vec![0.0; 10];
        profile[2] = 200.0;
        for v in &mut profile[4..7] {
            *v = 200.0;
        }
        let result = detect_peaks(&profile, 128.0, 2, 5);
        assert_eq!(result.count, 1);
        assert_eq!(result.positions, vec![0.5]);
    }

    #[test]
    fn peak_running_to_the_end_is_closed() {
        let profile = vec![0.0, 0.0, 0.0, 200.0, 200.0, 200.0];
        let result = detect_peaks(&profile, 128.0, 3, 0);
        assert_eq!(result.count, 1);
        assert_eq!(result.positions, vec![((3 + 6 - 1) as f64 / 2.0) / 6.0]);
    }

    #[test]
    fn unit_scale_profile() {
        let profile = vec![0.1, 0.9, 0.95, 0.2, 0.1, 0.1, 0.8, 0.7, 0.1];
        let result = detect_peaks(&profile, 0.5, 2, 3);
        assert_eq!(result.count, 2);
    }
}
