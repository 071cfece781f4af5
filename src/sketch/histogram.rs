//! K-mer abundance histograms and the per-sample coverage model the trio
//! likelihood stage scores against.

use serde::{Deserialize, Serialize};

/// Histogram of k-mer abundances observed in one sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbundanceHistogram {
    /// bins[a] = number of k-mers observed with abundance a.
    bins: Vec<u64>,
}

/// Haploid-coverage model for one sample: the expected abundance of a
/// k-mer present on one haplotype copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageModel {
    pub mu: f64,
    pub sigma: f64,
}

impl AbundanceHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, abundance: u16) {
        let a = abundance as usize;
        if a >= self.bins.len() {
            self.bins.resize(a + 1, 0);
        }
        self.bins[a] += 1;
    }

    pub fn record_all<I: IntoIterator<Item = u16>>(&mut self, abundances: I) {
        for a in abundances {
            self.record(a);
        }
    }

    /// Total k-mers recorded with non-zero abundance.
    pub fn nonzero_total(&self) -> u64 {
        self.bins.iter().skip(1).sum()
    }

    /// Abundance below which `fraction` of the non-zero mass lies.
    fn percentile(&self, fraction: f64) -> u16 {
        let total = self.nonzero_total();
        if total == 0 {
            return 0;
        }
        let target = (total as f64 * fraction).ceil() as u64;
        let mut seen = 0u64;
        for (a, &n) in self.bins.iter().enumerate().skip(1) {
            seen += n;
            if seen >= target {
                return a as u16;
            }
        }
        (self.bins.len() - 1) as u16
    }

    /// Estimate the haploid coverage model: mean and standard deviation of
    /// the non-zero abundances with the top tail (above the 99th
    /// percentile) excluded, halved from the diploid expectation.
    pub fn coverage_model(&self) -> Option<CoverageModel> {
        let cutoff = self.percentile(0.99).max(1);
        let mut n = 0u64;
        let mut sum = 0f64;
        for (a, &count) in self.bins.iter().enumerate().skip(1) {
            if a as u16 > cutoff {
                break;
            }
            n += count;
            sum += a as f64 * count as f64;
        }
        if n == 0 {
            return None;
        }
        let mean = sum / n as f64;
        let mut var_acc = 0f64;
        for (a, &count) in self.bins.iter().enumerate().skip(1) {
            if a as u16 > cutoff {
                break;
            }
            let d = a as f64 - mean;
            var_acc += d * d * count as f64;
        }
        let sd = (var_acc / n as f64).sqrt();

        // Bulk of counted k-mers sit on both haplotypes, so the histogram
        // mean approximates diploid coverage.
        Some(CoverageModel {
            mu: mean / 2.0,
            sigma: (sd / 2.0).max(0.5),
        })
    }
}

impl CoverageModel {
    /// Log-density of observing mean abundance `x` for a genotype carrying
    /// `copies` alt copies. Zero copies are modeled as sequencing error
    /// mass near zero.
    pub fn genotype_log_density(&self, x: f64, copies: u8) -> f64 {
        let (mean, sd) = if copies == 0 {
            (0.0, self.sigma.max(0.5))
        } else {
            let g = copies as f64;
            (self.mu * g, self.sigma * g.sqrt())
        };
        log_normal_pdf(x, mean, sd)
    }
}

/// Log of the Normal(mu, sd) density at x.
pub fn log_normal_pdf(x: f64, mu: f64, sd: f64) -> f64 {
    let sd = sd.max(1e-6);
    let z = (x - mu) / sd;
    -0.5 * z * z - sd.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}
