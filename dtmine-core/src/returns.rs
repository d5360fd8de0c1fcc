//! Discounted returns-to-go.
use crate::error::DtError;

/// Computes the reversed discounted cumulative sum of `rewards`.
///
/// `out[t] = rewards[t] + gamma * out[t + 1]` with `out[n - 1] = rewards[n - 1]`.
/// Accumulation is carried out in `f64` for every backend, so windows sliced from
/// the same episode always see the same values. An empty input yields an empty output.
pub fn discount_cumsum(rewards: &[f32], gamma: f64) -> Vec<f64> {
    let mut out = vec![0f64; rewards.len()];
    let mut acc = 0f64;
    for (t, r) in rewards.iter().enumerate().rev() {
        acc = *r as f64 + gamma * acc;
        out[t] = acc;
    }
    out
}

/// Same as [`discount_cumsum`], failing on the first non-finite value.
pub(crate) fn checked_discount_cumsum(rewards: &[f32], gamma: f64) -> Result<Vec<f64>, DtError> {
    let out = discount_cumsum(rewards, gamma);
    match out.iter().position(|v| !v.is_finite()) {
        Some(t) => Err(DtError::NonFiniteReturn(t)),
        None => Ok(out),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_half_discount() {
        let rtg = discount_cumsum(&[1.0, 1.0, 1.0], 0.5);
        assert_eq!(rtg, vec![1.75, 1.5, 1.0]);
    }

    #[test]
    fn test_no_discount_is_running_sum() {
        let rewards = [3.0f32, -1.0, 0.5, 2.0];
        let rtg = discount_cumsum(&rewards, 1.0);
        let mut expected = vec![0f64; rewards.len()];
        let mut acc = 0f64;
        for t in (0..rewards.len()).rev() {
            acc += rewards[t] as f64;
            expected[t] = acc;
        }
        assert_eq!(rtg, expected);
    }

    #[test]
    fn test_zero_discount_is_identity() {
        let rewards = [3.0f32, -1.0, 0.5, 2.0];
        let rtg = discount_cumsum(&rewards, 0.0);
        assert_eq!(rtg, vec![3.0, -1.0, 0.5, 2.0]);
    }

    #[test]
    fn test_empty() {
        assert!(discount_cumsum(&[], 0.99).is_empty());
    }

    #[test]
    fn test_nan_is_reported() {
        let res = checked_discount_cumsum(&[1.0, f32::NAN, 1.0], 1.0);
        // NaN propagates backwards to every earlier timestep.
        assert_eq!(res, Err(DtError::NonFiniteReturn(0)));
    }
}
