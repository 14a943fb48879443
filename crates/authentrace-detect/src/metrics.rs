//! Validation metrics for dual-branch training.
//!
//! Confusion-matrix metrics over predicted and ground-truth labels, with
//! class 0 = real (authentic) and class 1 = fake (synthetic).

/// Validation metrics computed from a confusion matrix.
#[derive(Debug, Clone)]
pub struct ValidationMetrics {
    /// Fraction of samples labeled correctly.
    pub accuracy: f64,
    /// Of everything flagged fake, how much really was.
    pub precision: f64,
    /// Of everything really fake, how much was flagged.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Fraction of real images wrongly flagged as fake.
    pub fpr: f64,
    /// True positives (fake flagged fake).
    pub tp: usize,
    /// False positives (real flagged fake).
    pub fp: usize,
    /// True negatives (real kept real).
    pub tn: usize,
    /// False negatives (fake kept real).
    pub fn_count: usize,
}

impl ValidationMetrics {
    /// All-zero metrics for an empty validation set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            fpr: 0.0,
            tp: 0,
            fp: 0,
            tn: 0,
            fn_count: 0,
        }
    }
}

/// Compute validation metrics from predicted and ground-truth labels.
///
/// # Panics
///
/// Panics when the slices differ in length.
#[must_use]
pub fn compute_validation_metrics(predictions: &[i64], labels: &[i64]) -> ValidationMetrics {
    assert_eq!(
        predictions.len(),
        labels.len(),
        "predictions and labels must have same length"
    );

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_count = 0usize;

    for (&pred, &label) in predictions.iter().zip(labels.iter()) {
        match (pred, label) {
            (1, 1) => tp += 1,
            (1, 0) => fp += 1,
            (0, 0) => tn += 1,
            (0, 1) => fn_count += 1,
            _ => {}
        }
    }

    let total = (tp + fp + tn + fn_count) as f64;
    let accuracy = if total > 0.0 {
        (tp + tn) as f64 / total
    } else {
        0.0
    };
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_count > 0 {
        tp as f64 / (tp + fn_count) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let fpr = if fp + tn > 0 {
        fp as f64 / (fp + tn) as f64
    } else {
        0.0
    };

    ValidationMetrics {
        accuracy,
        precision,
        recall,
        f1,
        fpr,
        tp,
        fp,
        tn,
        fn_count,
    }
}

impl std::fmt::Display for ValidationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} fpr={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.fpr,
            self.tp,
            self.fp,
            self.tn,
            self.fn_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let preds = vec![0, 1, 0, 1];
        let labels = vec![0, 1, 0, 1];
        let m = compute_validation_metrics(&preds, &labels);
        assert!((m.accuracy - 1.0).abs() < 1e-9);
        assert!((m.precision - 1.0).abs() < 1e-9);
        assert!((m.recall - 1.0).abs() < 1e-9);
        assert!((m.f1 - 1.0).abs() < 1e-9);
        assert!(m.fpr.abs() < 1e-9);
    }

    #[test]
    fn test_everything_flagged_fake() {
        // 2 real + 2 fake, all predicted fake: recall 1, precision 0.5, fpr 1.
        let preds = vec![1, 1, 1, 1];
        let labels = vec![0, 0, 1, 1];
        let m = compute_validation_metrics(&preds, &labels);
        assert!((m.recall - 1.0).abs() < 1e-9);
        assert!((m.precision - 0.5).abs() < 1e-9);
        assert!((m.fpr - 1.0).abs() < 1e-9);
        assert_eq!(m.fp, 2);
        assert_eq!(m.tp, 2);
    }

    #[test]
    fn test_missed_fakes_show_up_as_false_negatives() {
        let preds = vec![0, 0, 0];
        let labels = vec![0, 1, 1];
        let m = compute_validation_metrics(&preds, &labels);
        assert_eq!(m.fn_count, 2);
        assert_eq!(m.tn, 1);
        assert!(m.recall.abs() < 1e-9);
        assert!(m.fpr.abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_yields_zero_metrics() {
        let m = compute_validation_metrics(&[], &[]);
        assert!(m.accuracy.abs() < 1e-9);
        assert_eq!(m.tp + m.fp + m.tn + m.fn_count, 0);
    }

    #[test]
    fn test_display_is_compact() {
        let m = compute_validation_metrics(&[1, 0], &[1, 0]);
        let line = m.to_string();
        assert!(line.contains("acc=1.0000"));
        assert!(line.contains("tp=1"));
    }
}
