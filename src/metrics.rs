//! Validation metrics: confusion matrix and per-class classification report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Square matrix of counts, rows are true classes and columns predicted classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    classes: usize,
    counts: Vec<usize>,
}

impl ConfusionMatrix {
    /// Tallies `truth`/`predicted` pairs; ids at or above `classes` are ignored.
    ///
    /// ```
    /// use asl_mlp::metrics::ConfusionMatrix;
    ///
    /// let cm = ConfusionMatrix::new(2, &[0, 0, 1, 1], &[0, 1, 1, 1]);
    /// assert_eq!(cm.get(0, 1), 1);
    /// assert_eq!(cm.get(1, 1), 2);
    /// assert_eq!(cm.to_string(), "[[1 1]\n [0 2]]");
    /// ```
    pub fn new(classes: usize, truth: &[usize], predicted: &[usize]) -> ConfusionMatrix {
        let mut counts = vec![0; classes * classes];
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            if t < classes && p < classes {
                counts[t * classes + p] += 1;
            }
        }
        ConfusionMatrix { classes, counts }
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth * self.classes + predicted]
    }

    pub fn row(&self, truth: usize) -> &[usize] {
        &self.counts[truth * self.classes..(truth + 1) * self.classes]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.classes).map(|c| self.get(c, c)).sum()
    }

    /// Samples of class `class` (row sum).
    pub fn support(&self, class: usize) -> usize {
        self.row(class).iter().sum()
    }

    /// Samples predicted as `class` (column sum).
    pub fn predicted(&self, class: usize) -> usize {
        (0..self.classes).map(|t| self.get(t, class)).sum()
    }
}

/// Rendered like a numpy integer matrix.
impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);

        write!(f, "[")?;
        for t in 0..self.classes {
            if t > 0 {
                write!(f, "\n ")?;
            }
            write!(f, "[")?;
            for (p, count) in self.row(t).iter().enumerate() {
                if p > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{:>width$}", count, width = width)?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

/// Precision, recall and F1 of one class (or an average of classes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Per-class scores with accuracy and macro/weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub labels: Vec<String>,
    pub per_class: Vec<Scores>,
    pub accuracy: f64,
    pub macro_avg: Scores,
    pub weighted_avg: Scores,
    /// Decimal places used when printing.
    pub digits: usize,
}

impl ClassificationReport {
    /// Builds the report from a confusion matrix; undefined ratios (no predictions or no
    /// samples of a class) count as 0.
    pub fn from_confusion(matrix: &ConfusionMatrix, labels: &[String]) -> ClassificationReport {
        let per_class: Vec<Scores> = (0..matrix.classes())
            .map(|c| {
                let tp = matrix.get(c, c);
                let precision = ratio(tp, matrix.predicted(c));
                let recall = ratio(tp, matrix.support(c));
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                Scores {
                    precision,
                    recall,
                    f1,
                    support: matrix.support(c),
                }
            })
            .collect();

        let total = matrix.total();
        let n = per_class.len().max(1) as f64;
        let macro_avg = Scores {
            precision: per_class.iter().map(|s| s.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|s| s.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|s| s.f1).sum::<f64>() / n,
            support: total,
        };

        let weighted = |score: fn(&Scores) -> f64| {
            if total == 0 {
                0.0
            } else {
                per_class
                    .iter()
                    .map(|s| score(s) * s.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
        let weighted_avg = Scores {
            precision: weighted(|s| s.precision),
            recall: weighted(|s| s.recall),
            f1: weighted(|s| s.f1),
            support: total,
        };

        ClassificationReport {
            labels: labels.to_vec(),
            per_class,
            accuracy: ratio(matrix.correct(), total),
            macro_avg,
            weighted_avg,
            digits: 4,
        }
    }
}

fn write_scores(
    f: &mut fmt::Formatter,
    name: &str,
    s: &Scores,
    width: usize,
    digits: usize,
) -> fmt::Result {
    writeln!(
        f,
        "{:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}",
        name,
        s.precision,
        s.recall,
        s.f1,
        s.support,
        width = width,
        digits = digits
    )
}

/// Column layout of scikit-learn's text report.
impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const WEIGHTED: &str = "weighted avg";
        let width = self
            .labels
            .iter()
            .map(|l| l.chars().count())
            .chain(std::iter::once(WEIGHTED.len()))
            .max()
            .unwrap_or(WEIGHTED.len());
        let digits = self.digits;

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;

        for (label, scores) in self.labels.iter().zip(self.per_class.iter()) {
            write_scores(f, label, scores, width, digits)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.digits$} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            width = width,
            digits = digits
        )?;
        write_scores(f, "macro avg", &self.macro_avg, width, digits)?;
        write_scores(f, WEIGHTED, &self.weighted_avg, width, digits)
    }
}
