//! Volume ramp arithmetic.
//!
//! A fade is a sequence of fixed-size volume steps, one per timer tick.
//! `step` is pure so the controller can be driven by a logical clock in
//! tests and by a `tokio::time::Interval` in the daemon.

/// Volumes this close to the target snap to it and end the fade, so float
/// accumulation (0.1 * 10 != 1.0) cannot leave a fade one tick short.
const SNAP_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeStep {
    pub volume: f32,
    /// Target volume reached; the timer must be cancelled.
    pub finished: bool,
}

/// Advance `volume` one tick towards 1.0 (`In`) or 0.0 (`Out`).
pub fn step(direction: FadeDirection, volume: f32, increment: f32) -> FadeStep {
    let volume = volume.clamp(0.0, 1.0);
    match direction {
        FadeDirection::In => {
            let next = (volume + increment).min(1.0);
            if next >= 1.0 - SNAP_EPSILON {
                FadeStep {
                    volume: 1.0,
                    finished: true,
                }
            } else {
                FadeStep {
                    volume: next,
                    finished: false,
                }
            }
        }
        FadeDirection::Out => {
            let next = (volume - increment).max(0.0);
            if next <= SNAP_EPSILON {
                FadeStep {
                    volume: 0.0,
                    finished: true,
                }
            } else {
                FadeStep {
                    volume: next,
                    finished: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(direction: FadeDirection, start: f32, increment: f32) -> Vec<f32> {
        let mut volume = start;
        let mut seen = Vec::new();
        for _ in 0..100 {
            let next = step(direction, volume, increment);
            seen.push(next.volume);
            volume = next.volume;
            if next.finished {
                return seen;
            }
        }
        panic!("fade did not finish");
    }

    #[test]
    fn test_fade_in_takes_ten_ticks_and_lands_on_one() {
        let volumes = run(FadeDirection::In, 0.0, 0.1);
        assert_eq!(volumes.len(), 10);
        assert_eq!(*volumes.last().unwrap(), 1.0);
        assert!(volumes.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_fade_out_is_monotonic_and_lands_on_zero() {
        let volumes = run(FadeDirection::Out, 1.0, 0.1);
        assert_eq!(volumes.len(), 10);
        assert_eq!(*volumes.last().unwrap(), 0.0);
        assert!(volumes.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_reversal_starts_from_current_volume() {
        let volumes = run(FadeDirection::Out, 0.35, 0.1);
        assert_eq!(volumes.len(), 4);
        assert!((volumes[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_already_at_target_finishes_immediately() {
        assert_eq!(
            step(FadeDirection::Out, 0.0, 0.1),
            FadeStep {
                volume: 0.0,
                finished: true
            }
        );
        assert_eq!(
            step(FadeDirection::In, 1.0, 0.1),
            FadeStep {
                volume: 1.0,
                finished: true
            }
        );
    }
}
