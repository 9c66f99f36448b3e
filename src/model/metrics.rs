//! Held-out evaluation: accuracy, per-class report, confusion matrix,
//! ROC / precision-recall curves and ranked feature importances.

use serde::Serialize;
use std::fmt;

use super::forest::HyperParams;
use super::search::SearchOutcome;

/// Display names for label 0 and label 1.
pub const CLASS_NAMES: [&str; 2] = ["team2 win", "team1 win"];

/// Rows are the true label, columns the prediction: `[[TN, FP], [FN, TP]]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix(pub [[u64; 2]; 2]);

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[u8], predicted: &[u8]) -> Self {
        let mut m = [[0u64; 2]; 2];
        for (&t, &p) in truth.iter().zip(predicted) {
            m[usize::from(t == 1)][usize::from(p == 1)] += 1;
        }
        ConfusionMatrix(m)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.0[0][0] + self.0[1][1], self.total())
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let m = cm.0;
        let classes: Vec<ClassMetrics> = (0..2)
            .map(|c| {
                let tp = m[c][c];
                let predicted = m[0][c] + m[1][c];
                let support = m[c][0] + m[c][1];
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: CLASS_NAMES[c].to_string(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let total = cm.total();
        let macro_avg = averaged("macro avg", &classes, &[1.0, 1.0], total);
        let supports: Vec<f64> = classes.iter().map(|c| c.support as f64).collect();
        let weighted_avg = averaged("weighted avg", &classes, &supports, total);

        ClassificationReport {
            classes,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

fn averaged(label: &str, classes: &[ClassMetrics], weights: &[f64], support: u64) -> ClassMetrics {
    let wsum: f64 = weights.iter().sum();
    let mean = |f: fn(&ClassMetrics) -> f64| {
        if wsum == 0.0 {
            0.0
        } else {
            classes.iter().zip(weights).map(|(c, w)| f(c) * w).sum::<f64>() / wsum
        }
    };
    ClassMetrics {
        label: label.to_string(),
        precision: mean(|c| c.precision),
        recall: mean(|c| c.recall),
        f1: mean(|c| c.f1),
        support,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for c in [&self.macro_avg, &self.weighted_avg] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    /// Score at or above which a sample is called positive; `None` for the
    /// (0, 0) origin.
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    /// Trapezoid-rule area. `None` when the held-out split lacks a class.
    pub auc: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrPoint {
    pub precision: f64,
    pub recall: f64,
    pub threshold: Option<f64>,
}

/// Cumulative (threshold, tp, fp) at each distinct score, highest first.
fn threshold_counts(truth: &[u8], scores: &[f64]) -> Vec<(f64, u64, u64)> {
    let mut pairs: Vec<(f64, u8)> = scores.iter().copied().zip(truth.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut out: Vec<(f64, u64, u64)> = Vec::new();
    let (mut tp, mut fp) = (0u64, 0u64);
    for (i, &(score, y)) in pairs.iter().enumerate() {
        if y == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_run = pairs.get(i + 1).map_or(true, |next| next.0 != score);
        if last_of_run {
            out.push((score, tp, fp));
        }
    }
    out
}

pub fn roc_curve(truth: &[u8], scores: &[f64]) -> RocCurve {
    let positives = truth.iter().filter(|&&y| y == 1).count() as u64;
    let negatives = truth.len() as u64 - positives;

    let mut points = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: None,
    }];
    for (threshold, tp, fp) in threshold_counts(truth, scores) {
        points.push(RocPoint {
            fpr: ratio(fp, negatives),
            tpr: ratio(tp, positives),
            threshold: Some(threshold),
        });
    }

    let auc = (positives > 0 && negatives > 0).then(|| {
        points
            .windows(2)
            .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
            .sum::<f64>()
    });
    RocCurve { points, auc }
}

/// Precision/recall at each distinct threshold, lowest threshold first,
/// ending with the conventional (precision 1, recall 0) point.
/// Recall is 0 throughout when the split holds no positives.
pub fn precision_recall_curve(truth: &[u8], scores: &[f64]) -> Vec<PrPoint> {
    let positives = truth.iter().filter(|&&y| y == 1).count() as u64;
    let mut points: Vec<PrPoint> = threshold_counts(truth, scores)
        .into_iter()
        .map(|(threshold, tp, fp)| PrPoint {
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, positives),
            threshold: Some(threshold),
        })
        .collect();
    points.reverse();
    points.push(PrPoint {
        precision: 1.0,
        recall: 0.0,
        threshold: None,
    });
    points
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

/// Pair every reportable name with its importance (0 for names the model
/// never saw) and rank highest first; equal weights keep schema order.
pub fn rank_importances(all_names: &[&str], used_names: &[&str], weights: &[f64]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = all_names
        .iter()
        .map(|name| FeatureImportance {
            name: name.to_string(),
            importance: used_names
                .iter()
                .position(|u| u == name)
                .and_then(|i| weights.get(i).copied())
                .unwrap_or(0.0),
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

/// Everything produced by one training run, measured on the held-out split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub classification_report: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    pub roc: RocCurve,
    pub precision_recall: Vec<PrPoint>,
    pub feature_importance: Vec<FeatureImportance>,
    pub best_params: HyperParams,
    pub cv_accuracy: Option<f64>,
    pub cv_folds: usize,
    pub train_size: usize,
    pub test_size: usize,
}

impl EvaluationReport {
    pub fn build(
        truth: &[u8],
        scores: &[f64],
        feature_importance: Vec<FeatureImportance>,
        search: &SearchOutcome,
        train_size: usize,
    ) -> Self {
        let predicted: Vec<u8> = scores.iter().map(|&p| u8::from(p > 0.5)).collect();
        let confusion_matrix = ConfusionMatrix::from_predictions(truth, &predicted);
        EvaluationReport {
            accuracy: confusion_matrix.accuracy(),
            classification_report: ClassificationReport::from_confusion(&confusion_matrix),
            confusion_matrix,
            roc: roc_curve(truth, scores),
            precision_recall: precision_recall_curve(truth, scores),
            feature_importance,
            best_params: search.best,
            cv_accuracy: search.best_cv_accuracy,
            cv_folds: search.folds,
            train_size,
            test_size: truth.len(),
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model Accuracy: {:.2}", self.accuracy)?;
        writeln!(
            f,
            "Split: {} train / {} held out",
            self.train_size, self.test_size
        )?;
        match self.cv_accuracy {
            Some(acc) => writeln!(
                f,
                "Best params: {} ({}-fold CV accuracy {:.4})",
                self.best_params, self.cv_folds, acc
            )?,
            None => writeln!(f, "Best params: {} (not cross-validated)", self.best_params)?,
        }
        writeln!(f)?;
        writeln!(f, "Classification Report:")?;
        write!(f, "{}", self.classification_report)?;
        writeln!(f)?;
        let m = self.confusion_matrix.0;
        writeln!(f, "Confusion Matrix (rows = true, cols = predicted):")?;
        writeln!(f, "{:>12} {:>10} {:>10}", "", CLASS_NAMES[0], CLASS_NAMES[1])?;
        for (c, row) in m.iter().enumerate() {
            writeln!(f, "{:>12} {:>10} {:>10}", CLASS_NAMES[c], row[0], row[1])?;
        }
        writeln!(f)?;
        match self.roc.auc {
            Some(auc) => writeln!(f, "ROC AUC: {:.4}", auc)?,
            None => writeln!(f, "ROC AUC: undefined (held-out split has one class)")?,
        }
        writeln!(f)?;
        writeln!(f, "Feature Importance:")?;
        for fi in &self.feature_importance {
            writeln!(f, "  {:<24} {:.4}", fi.name, fi.importance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn confusion_matrix_layout() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1, 1], &[0, 1, 0, 1, 1]);
        assert_eq!(cm.0, [[1, 1], [1, 2]]);
        assert_eq!(cm.total(), 5);
        assert_relative_eq!(cm.accuracy(), 0.6);
    }

    #[test]
    fn classification_report_per_class() {
        let cm = ConfusionMatrix([[1, 1], [1, 2]]);
        let r = ClassificationReport::from_confusion(&cm);
        assert_relative_eq!(r.classes[1].precision, 2.0 / 3.0);
        assert_relative_eq!(r.classes[1].recall, 2.0 / 3.0);
        assert_relative_eq!(r.classes[0].precision, 0.5);
        assert_eq!(r.classes[0].support, 2);
        assert_relative_eq!(r.macro_avg.precision, (0.5 + 2.0 / 3.0) / 2.0);
        assert_relative_eq!(
            r.weighted_avg.recall,
            (0.5 * 2.0 + 2.0 / 3.0 * 3.0) / 5.0,
            epsilon = 1e-12
        );
        assert!(r.to_string().contains("team1 win"));
    }

    #[test]
    fn zero_division_yields_zero() {
        let r = ClassificationReport::from_confusion(&ConfusionMatrix([[0, 1], [0, 0]]));
        assert_eq!(r.classes[0].precision, 0.0);
        assert_eq!(r.classes[1].recall, 0.0);
        assert_eq!(r.classes[1].f1, 0.0);
    }

    #[test]
    fn perfect_ranking_has_unit_auc() {
        let roc = roc_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]);
        assert_relative_eq!(roc.auc.unwrap(), 0.75);
        let perfect = roc_curve(&[0, 0, 1, 1], &[0.1, 0.2, 0.7, 0.8]);
        assert_relative_eq!(perfect.auc.unwrap(), 1.0);
        let last = perfect.points.last().unwrap();
        assert_eq!((last.fpr, last.tpr), (1.0, 1.0));
        assert_eq!(perfect.points[0].threshold, None);
    }

    #[test]
    fn tied_scores_collapse_to_one_point() {
        let roc = roc_curve(&[0, 1, 1], &[0.5, 0.5, 0.5]);
        assert_eq!(roc.points.len(), 2);
        assert_relative_eq!(roc.auc.unwrap(), 0.5);
    }

    #[test]
    fn single_class_split_has_no_auc() {
        let roc = roc_curve(&[0], &[1.0]);
        assert_eq!(roc.auc, None);
        assert_eq!(roc.points.len(), 2);
    }

    #[test]
    fn precision_recall_points() {
        let pr = precision_recall_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]);
        // thresholds ascending: 0.1, 0.35, 0.4, 0.8, then the terminal point
        assert_eq!(pr.len(), 5);
        assert_relative_eq!(pr[0].precision, 0.5);
        assert_relative_eq!(pr[0].recall, 1.0);
        assert_relative_eq!(pr[3].precision, 1.0);
        assert_relative_eq!(pr[3].recall, 0.5);
        assert_eq!(pr[4], PrPoint { precision: 1.0, recall: 0.0, threshold: None });
    }

    #[test]
    fn importances_rank_and_report_unused_features() {
        let ranked = rank_importances(&["a", "b", "c"], &["a", "b"], &[0.25, 0.75]);
        let names: Vec<&str> = ranked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(ranked[2].importance, 0.0);
    }
}
