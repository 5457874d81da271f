/// Useful enumerations for units and fit variables.
pub mod enums;
/// Traits and structs which can be used to extract fit variables from
/// [`TruthEvent`](crate::data::TruthEvent)s.
pub mod variables;
/// Minimal 3-vector and four-momentum types.
pub mod vectors;

/// The `bins + 1` edges of evenly spaced bins over `range`. The last edge is exactly `range.1`.
///
/// # See Also
/// [`get_bin_index`]
pub fn get_bin_edges(bins: usize, range: (f64, f64)) -> Vec<f64> {
    let span = range.1 - range.0;
    (0..=bins)
        .map(|edge| range.0 + span * (edge as f64 / bins as f64))
        .collect()
}

/// The bin of `value` among evenly spaced `bins` over the half-open interval `[limits.0, limits.1)`,
/// or `None` for under- and overflow.
pub fn get_bin_index(value: f64, bins: usize, limits: (f64, f64)) -> Option<usize> {
    if !(limits.0..limits.1).contains(&value) {
        return None;
    }
    let fraction = (value - limits.0) / (limits.1 - limits.0);
    Some(((fraction * bins as f64) as usize).min(bins - 1))
}

/// A simple struct which represents a histogram
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// The number of counts in each bin (can be `f64`s since these might be weighted counts)
    pub counts: Vec<f64>,
    /// The sum of squared weights in each bin, used for the statistical uncertainty
    pub sumw2: Vec<f64>,
    /// The edges of each bin (length is one greater than `counts`)
    pub bin_edges: Vec<f64>,
}

impl Histogram {
    /// The number of bins.
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    /// The statistical uncertainty $`\sqrt{\sum w^2}`$ of each bin.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|w2| w2.sqrt()).collect()
    }

    /// The sum of all bin contents (under- and overflow excluded).
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }
}

/// A method which creates a histogram from some data by binning it with evenly spaced `bins` within
/// the given `range`
///
/// # Panics
///
/// Panics if `bins` is zero, if the range is empty, or if `weights` is given with a different
/// length than `values`.
pub fn histogram<T: AsRef<[f64]>>(
    values: T,
    bins: usize,
    range: (f64, f64),
    weights: Option<T>,
) -> Histogram {
    assert!(bins > 0, "Number of bins must be greater than zero!");
    assert!(
        range.1 > range.0,
        "The lower edge of the range must be smaller than the upper edge!"
    );
    if let Some(w) = &weights {
        assert_eq!(
            values.as_ref().len(),
            w.as_ref().len(),
            "`values` and `weights` must have the same length!"
        );
    }
    let mut counts = vec![0.0; bins];
    let mut sumw2 = vec![0.0; bins];
    for (i, &value) in values.as_ref().iter().enumerate() {
        if let Some(bin_index) = get_bin_index(value, bins, range) {
            let weight = weights.as_ref().map_or(1.0, |w| w.as_ref()[i]);
            counts[bin_index] += weight;
            sumw2[bin_index] += weight * weight;
        }
    }
    Histogram {
        counts,
        sumw2,
        bin_edges: get_bin_edges(bins, range),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binning() {
        assert_eq!(get_bin_index(0.0, 3, (0.0, 1.0)), Some(0));
        assert_eq!(get_bin_index(0.1, 3, (0.0, 1.0)), Some(0));
        assert_eq!(get_bin_index(0.5, 3, (0.0, 1.0)), Some(1));
        assert_eq!(get_bin_index(0.9, 3, (0.0, 1.0)), Some(2));
        assert_eq!(get_bin_index(1.0, 3, (0.0, 1.0)), None);
        assert_eq!(get_bin_index(-0.5, 3, (0.0, 1.0)), None);
        assert_eq!(get_bin_edges(4, (-1.0, 1.0)), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(get_bin_edges(3, (0.0, 0.3)).last(), Some(&0.3));
        assert_eq!(get_bin_index(f64::NAN, 3, (0.0, 1.0)), None);
    }

    #[test]
    fn test_weighted_histogram() {
        let values = vec![0.1, 0.2, 0.6, 2.0];
        let weights = vec![0.5, 1.5, 2.0, 7.0];
        let hist = histogram(&values, 2, (0.0, 1.0), Some(&weights));
        assert_eq!(hist.counts, vec![2.0, 2.0]);
        assert_eq!(hist.sumw2, vec![2.5, 4.0]);
        assert_eq!(hist.errors()[1], 2.0);
        assert_eq!(hist.integral(), 4.0);
        assert_eq!(hist.n_bins(), 2);
    }
}
