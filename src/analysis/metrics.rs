use log::warn;
use serde::{Deserialize, Serialize};

/// Mechanism instance an error metric describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorMetricKind {
    PartitionSelection,
    Count,
    PrivacyIdCount,
}

/// Error of one mechanism on one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionErrorMetrics {
    pub metric: ErrorMetricKind,
    /// Value the mechanism would output without DP.
    pub true_value: f64,
    pub bias: f64,
    pub variance: f64,
}

impl PartitionErrorMetrics {
    pub fn new(
        metric: ErrorMetricKind,
        true_value: f64,
        bias: f64,
        variance: f64,
    ) -> Self {
        Self {
            metric,
            true_value,
            bias,
            variance,
        }
    }

    /// Models the partition being released only with probability
    /// `retention_probability`: the output becomes `B * (X + N)` with
    /// `B ~ Bernoulli(retention_probability)`.
    pub fn with_partition_selection(self, retention_probability: f64) -> Self {
        let q = retention_probability;
        let mean = self.true_value + self.bias;
        Self {
            bias: q * self.bias - (1.0 - q) * self.true_value,
            variance: q * self.variance + q * (1.0 - q) * mean * mean,
            ..self
        }
    }

    /// Relative bias, 0 when the true value is 0.
    pub fn rel_bias(&self) -> f64 {
        match self.true_value == 0.0 {
            true => 0.0,
            false => self.bias / self.true_value,
        }
    }

    /// Relative variance, 0 when the true value is 0.
    pub fn rel_variance(&self) -> f64 {
        match self.true_value == 0.0 {
            true => 0.0,
            false => self.variance / (self.true_value * self.true_value),
        }
    }
}

/// Error of one mechanism, averaged over all partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateErrorMetrics {
    pub metric: ErrorMetricKind,
    pub abs_error_expected: f64,
    pub abs_error_variance: f64,
    pub rel_error_expected: f64,
    pub rel_error_variance: f64,
}

/// Running per-partition mean of the error of one mechanism.
#[derive(Debug, Clone)]
pub struct ErrorMetricsAccumulator {
    metric: ErrorMetricKind,
    num_partitions: u64,
    num_zero_true_value: u64,
    sum_bias: f64,
    sum_variance: f64,
    sum_rel_bias: f64,
    sum_rel_variance: f64,
}

impl ErrorMetricsAccumulator {
    pub fn new(metric: ErrorMetricKind) -> Self {
        Self {
            metric,
            num_partitions: 0,
            num_zero_true_value: 0,
            sum_bias: 0.0,
            sum_variance: 0.0,
            sum_rel_bias: 0.0,
            sum_rel_variance: 0.0,
        }
    }

    pub fn add(&mut self, partition: &PartitionErrorMetrics) {
        debug_assert_eq!(partition.metric, self.metric);
        self.num_partitions += 1;
        if partition.true_value == 0.0 {
            self.num_zero_true_value += 1;
        }
        self.sum_bias += partition.bias;
        self.sum_variance += partition.variance;
        self.sum_rel_bias += partition.rel_bias();
        self.sum_rel_variance += partition.rel_variance();
    }

    pub fn num_partitions(&self) -> u64 {
        self.num_partitions
    }

    pub fn finalize(&self) -> AggregateErrorMetrics {
        if self.num_zero_true_value > 0 {
            warn!(
                "{:?}: {} of {} partitions have a true value of 0, their relative error is counted as 0",
                self.metric, self.num_zero_true_value, self.num_partitions
            );
        }
        let n = self.num_partitions.max(1) as f64;
        AggregateErrorMetrics {
            metric: self.metric,
            abs_error_expected: self.sum_bias / n,
            abs_error_variance: self.sum_variance / n,
            rel_error_expected: self.sum_rel_bias / n,
            rel_error_variance: self.sum_rel_variance / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_mean_over_partitions() {
        let mut acc = ErrorMetricsAccumulator::new(ErrorMetricKind::Count);
        acc.add(&PartitionErrorMetrics::new(
            ErrorMetricKind::Count,
            10.0,
            -2.0,
            4.0,
        ));
        acc.add(&PartitionErrorMetrics::new(
            ErrorMetricKind::Count,
            20.0,
            -6.0,
            8.0,
        ));
        let result = acc.finalize();

        assert_eq!(acc.num_partitions(), 2);
        assert_relative_eq!(result.abs_error_expected, -4.0);
        assert_relative_eq!(result.abs_error_variance, 6.0);
        // (-0.2 + -0.3) / 2
        assert_relative_eq!(result.rel_error_expected, -0.25);
        // (0.04 + 0.02) / 2
        assert_relative_eq!(result.rel_error_variance, 0.03);
    }

    #[test]
    fn test_zero_true_value_does_not_divide() {
        let mut acc = ErrorMetricsAccumulator::new(ErrorMetricKind::Count);
        acc.add(&PartitionErrorMetrics::new(
            ErrorMetricKind::Count,
            0.0,
            0.0,
            3.0,
        ));
        let result = acc.finalize();
        assert_relative_eq!(result.abs_error_variance, 3.0);
        assert_eq!(result.rel_error_expected, 0.0);
        assert_eq!(result.rel_error_variance, 0.0);
        assert!(result.rel_error_variance.is_finite());
    }

    #[test]
    fn test_no_partitions() {
        let acc = ErrorMetricsAccumulator::new(ErrorMetricKind::Count);
        let result = acc.finalize();
        assert_eq!(result.abs_error_expected, 0.0);
        assert_eq!(result.rel_error_variance, 0.0);
    }

    #[test]
    fn test_partition_selection_scaling() {
        let partition =
            PartitionErrorMetrics::new(ErrorMetricKind::Count, 10.0, -2.0, 4.0);

        // Certain release leaves the error untouched.
        assert_eq!(partition.clone().with_partition_selection(1.0), partition);

        // Never released: the whole true value is lost, deterministically.
        let dropped = partition.clone().with_partition_selection(0.0);
        assert_relative_eq!(dropped.bias, -10.0);
        assert_relative_eq!(dropped.variance, 0.0);

        let half = partition.with_partition_selection(0.5);
        // 0.5 * -2 - 0.5 * 10
        assert_relative_eq!(half.bias, -6.0);
        // 0.5 * 4 + 0.25 * 8^2
        assert_relative_eq!(half.variance, 18.0);
    }
}
