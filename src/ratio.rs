use std::{fmt::Display, str::FromStr};

use crate::{
    data::WeightTable,
    utils::{enums::Observable, get_bin_edges, histogram, Histogram},
    FfrwError, FfrwResult,
};

/// Evenly spaced bins over a range.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Binning {
    /// Number of bins.
    pub bins: usize,
    /// Lower and upper edge.
    pub range: (f64, f64),
}

impl Binning {
    /// Create a binning, rejecting an empty range or zero bins.
    pub fn new(bins: usize, range: (f64, f64)) -> FfrwResult<Self> {
        if bins == 0 || !(range.1 > range.0) {
            return Err(FfrwError::Custom(format!(
                "Invalid binning: {bins} bins over ({}, {})",
                range.0, range.1
            )));
        }
        Ok(Self { bins, range })
    }

    /// The default binning used when comparing distributions of `observable`.
    pub fn for_observable(observable: Observable) -> Self {
        match observable {
            Observable::Q2 | Observable::MissingMass2 => Self {
                bins: 80,
                range: (-3.0, 12.0),
            },
            Observable::LeptonEnergy => Self {
                bins: 80,
                range: (-0.5, 3.5),
            },
        }
    }

    /// The bin edges.
    pub fn edges(&self) -> Vec<f64> {
        get_bin_edges(self.bins, self.range)
    }
}

impl Display for Binning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.bins, self.range.0, self.range.1)
    }
}

/// Parses `"(bins,low,high)"`; the parentheses are optional.
impl FromStr for Binning {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = || FfrwError::ParseError {
            name: s.to_string(),
            object: "Binning".to_string(),
        };
        let inner = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')');
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        let [bins, low, high] = parts.as_slice() else {
            return Err(parse_error());
        };
        let bins = bins.parse::<usize>().map_err(|_| parse_error())?;
        let low = low.parse::<f64>().map_err(|_| parse_error())?;
        let high = high.parse::<f64>().map_err(|_| parse_error())?;
        Self::new(bins, (low, high))
    }
}

/// One bin of a [`HistogramRatio`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RatioBin {
    /// Lower bin edge.
    pub low: f64,
    /// Upper bin edge.
    pub high: f64,
    /// Unweighted count.
    pub unweighted: f64,
    /// Sum of weights.
    pub weighted: f64,
    /// `unweighted / weighted`, absent when the weighted bin is empty.
    pub ratio: Option<f64>,
    /// Uncertainty on `ratio`.
    pub error: Option<f64>,
}

/// An unweighted and a weighted histogram of the same values, and their ratio.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramRatio {
    /// The histogram without weights.
    pub unweighted: Histogram,
    /// The histogram filled with the form-factor weights.
    pub weighted: Histogram,
}

impl HistogramRatio {
    /// Per-bin ratios of the unweighted over the weighted histogram.
    ///
    /// Uncertainties are propagated as if the two histograms were independent, which
    /// overestimates them since both are filled from the same events.
    pub fn bins(&self) -> Vec<RatioBin> {
        let edges = &self.unweighted.bin_edges;
        (0..self.unweighted.n_bins())
            .map(|i| {
                let n = self.unweighted.counts[i];
                let w = self.weighted.counts[i];
                let (ratio, error) = if w != 0.0 {
                    let ratio = n / w;
                    let rel_n2 = if n != 0.0 {
                        self.unweighted.sumw2[i] / (n * n)
                    } else {
                        0.0
                    };
                    let rel_w2 = self.weighted.sumw2[i] / (w * w);
                    (Some(ratio), Some(ratio.abs() * (rel_n2 + rel_w2).sqrt()))
                } else {
                    (None, None)
                };
                RatioBin {
                    low: edges[i],
                    high: edges[i + 1],
                    unweighted: n,
                    weighted: w,
                    ratio,
                    error,
                }
            })
            .collect()
    }
}

impl Display for HistogramRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:>10} {:>10} {:>12} {:>12} {:>10} {:>10}",
            "low", "high", "unweighted", "weighted", "ratio", "error"
        )?;
        for bin in self.bins() {
            write!(
                f,
                "{:>10.4} {:>10.4} {:>12.2} {:>12.2}",
                bin.low, bin.high, bin.unweighted, bin.weighted
            )?;
            match (bin.ratio, bin.error) {
                (Some(ratio), Some(error)) => writeln!(f, " {ratio:>10.4} {error:>10.4}")?,
                _ => writeln!(f, " {:>10} {:>10}", "-", "-")?,
            }
        }
        Ok(())
    }
}

/// Fill `values` once without and once with `weights` and return both histograms.
pub fn compare(values: &[f64], weights: &[f64], binning: &Binning) -> FfrwResult<HistogramRatio> {
    if values.len() != weights.len() {
        return Err(FfrwError::LengthMismatch {
            context: "Ratio weights".to_string(),
            expected: values.len(),
            actual: weights.len(),
        });
    }
    Ok(HistogramRatio {
        unweighted: histogram(values, binning.bins, binning.range, None::<&[f64]>),
        weighted: histogram(values, binning.bins, binning.range, Some(weights)),
    })
}

/// [`compare`] applied to one fit variable of a [`WeightTable`].
pub fn compare_observable(
    table: &WeightTable,
    observable: Observable,
    binning: &Binning,
) -> FfrwResult<HistogramRatio> {
    compare(table.column(observable), table.weights(), binning)
}
