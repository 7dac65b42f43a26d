use rand::Rng;

/// Weighted index generator using Vose's alias method.
///
/// Construction is O(n); every draw costs two uniform random numbers.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    prob: Vec<f64>,
    alias: Vec<usize>,
}

impl WeightedSampler {
    /// Build a sampler over `weights`. Non-finite or non-positive weights are
    /// treated as zero; if nothing positive remains the sampler is uniform.
    ///
    /// Returns `None` for an empty weight list.
    pub fn new(weights: &[f64]) -> Option<Self> {
        let n = weights.len();
        if n == 0 {
            return None;
        }

        let cleaned: Vec<f64> = weights
            .iter()
            .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
            .collect();
        let sum: f64 = cleaned.iter().sum();

        // Scale so the weights sum to n.
        let mut scaled: Vec<f64> = if sum > 0.0 {
            cleaned.iter().map(|w| w * n as f64 / sum).collect()
        } else {
            vec![1.0; n]
        };

        let mut prob = vec![1.0; n];
        let mut alias: Vec<usize> = (0..n).collect();

        let mut small = Vec::with_capacity(n);
        let mut large = Vec::with_capacity(n);
        for (i, p) in scaled.iter().enumerate() {
            if *p < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        while !small.is_empty() && !large.is_empty() {
            let (less, more) = match (small.pop(), large.pop()) {
                (Some(less), Some(more)) => (less, more),
                _ => break,
            };

            prob[less] = scaled[less];
            alias[less] = more;

            scaled[more] = scaled[more] + scaled[less] - 1.0;
            if scaled[more] < 1.0 {
                small.push(more);
            } else {
                large.push(more);
            }
        }

        // Leftovers are rounding residue; they keep their own cell.
        for i in small.into_iter().chain(large) {
            prob[i] = 1.0;
        }

        Some(Self { prob, alias })
    }

    pub fn len(&self) -> usize {
        self.prob.len()
    }

    pub fn sample(&self) -> usize {
        self.sample_with(&mut rand::thread_rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let i = rng.gen_range(0..self.prob.len());
        if rng.gen::<f64>() < self.prob[i] {
            i
        } else {
            self.alias[i]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn frequencies(sampler: &WeightedSampler, draws: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = vec![0usize; sampler.len()];
        for _ in 0..draws {
            counts[sampler.sample_with(&mut rng)] += 1;
        }
        counts.iter().map(|c| *c as f64 / draws as f64).collect()
    }

    #[test]
    fn test_empty_weights_rejected() {
        assert!(WeightedSampler::new(&[]).is_none());
    }

    #[test]
    fn test_single_weight_always_zero() {
        let sampler = WeightedSampler::new(&[42.0]).unwrap();
        for _ in 0..1000 {
            assert_eq!(sampler.sample(), 0);
        }
    }

    #[test]
    fn test_equal_weights_are_uniform() {
        let sampler = WeightedSampler::new(&[10.0, 10.0, 10.0, 10.0]).unwrap();
        assert!(sampler.prob.iter().all(|p| *p == 1.0));

        for freq in frequencies(&sampler, 200_000) {
            assert!((freq - 0.25).abs() < 0.01, "frequency {} not near 0.25", freq);
        }
    }

    #[test]
    fn test_frequencies_follow_weights() {
        let weights = [60.0, 35.0, 5.0];
        let sampler = WeightedSampler::new(&weights).unwrap();
        let total: f64 = weights.iter().sum();

        let freqs = frequencies(&sampler, 300_000);
        for (freq, weight) in freqs.iter().zip(weights.iter()) {
            let expected = weight / total;
            assert!(
                (freq - expected).abs() < 0.01,
                "frequency {} not near {}",
                freq,
                expected
            );
        }
    }

    #[test]
    fn test_zero_weight_is_never_drawn() {
        let sampler = WeightedSampler::new(&[0.0, 1.0]).unwrap();
        let freqs = frequencies(&sampler, 10_000);
        assert_eq!(freqs[0], 0.0);
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_uniform() {
        let sampler = WeightedSampler::new(&[0.0, -3.0, f64::NAN]).unwrap();
        for freq in frequencies(&sampler, 90_000) {
            assert!((freq - 1.0 / 3.0).abs() < 0.015);
        }
    }
}
