//! Interpretation of attributions
//!
//! Ranks the eleven contributions by magnitude and labels which way each one
//! pushes the prediction. Positive contributions lean male (class 1).

use crate::types::{FeatureInfluence, FeatureVector, Lean, Scored};

/// Contributions smaller than this are reported as neutral
pub const NEUTRAL_THRESHOLD: f64 = 1e-9;

/// Ranked, labelled view of one prediction
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Probability of passing as female, in percent
    pub passing_percent: f64,
    pub baseline: f64,
    /// Features ordered by |contribution|, largest first
    pub influences: Vec<FeatureInfluence>,
}

impl Explanation {
    pub fn from_scored(features: &FeatureVector, scored: &Scored) -> Self {
        let mut influences: Vec<FeatureInfluence> = features
            .iter()
            .map(|(feature, value)| {
                let contribution = scored.attribution.contribution(feature);
                FeatureInfluence {
                    feature,
                    value,
                    contribution,
                    lean: Lean::from_contribution(contribution),
                }
            })
            .collect();

        // Stable sort keeps column order among ties
        influences.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        Self {
            passing_percent: scored.probability_female * 100.0,
            baseline: scored.attribution.baseline,
            influences,
        }
    }

    /// The `n` strongest influences
    pub fn top(&self, n: usize) -> &[FeatureInfluence] {
        &self.influences[..n.min(self.influences.len())]
    }

    pub fn passing_text(&self) -> String {
        format!(
            "probability of passing as female: {:.2}%",
            self.passing_percent
        )
    }

    /// One line per feature, strongest first
    pub fn lines(&self) -> Vec<String> {
        self.influences
            .iter()
            .map(|inf| {
                let direction = match inf.lean {
                    Lean::Male => "towards male",
                    Lean::Female => "towards female",
                    Lean::Neutral => "no effect",
                };
                format!(
                    "{:<8} {:>10.4}  {:+.4} {} ({})",
                    inf.feature.name(),
                    inf.value,
                    inf.contribution,
                    direction,
                    inf.feature.description()
                )
            })
            .collect()
    }

    /// Human-readable report for terminals
    pub fn render_text(&self) -> String {
        let mut out = self.passing_text();
        out.push('\n');
        out.push_str(&format!("baseline margin: {:+.4}\n", self.baseline));
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

impl Lean {
    pub fn from_contribution(contribution: f64) -> Lean {
        if contribution > NEUTRAL_THRESHOLD {
            Lean::Male
        } else if contribution < -NEUTRAL_THRESHOLD {
            Lean::Female
        } else {
            Lean::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{demo_engine, demo_features};
    use crate::types::Feature;
    use pretty_assertions::assert_eq;

    fn demo_explanation() -> Explanation {
        let features = demo_features();
        let scored = demo_engine().score(&features).unwrap();
        Explanation::from_scored(&features, &scored)
    }

    #[test]
    fn test_ranked_by_magnitude() {
        let explanation = demo_explanation();
        assert_eq!(explanation.influences.len(), 11);
        for pair in explanation.influences.windows(2) {
            assert!(pair[0].contribution.abs() >= pair[1].contribution.abs());
        }
        // stature ~0.287, BBHB ~0.254, CS ~0.154
        let top: Vec<Feature> = explanation.top(3).iter().map(|inf| inf.feature).collect();
        assert_eq!(top, vec![Feature::Stature, Feature::Bbhb, Feature::Cs]);
        assert_eq!(explanation.influences[0].lean, Lean::Male);
    }

    #[test]
    fn test_unused_features_neutral() {
        let explanation = demo_explanation();
        let hbs = explanation
            .influences
            .iter()
            .find(|inf| inf.feature == Feature::Hbs)
            .unwrap();
        assert_eq!(hbs.lean, Lean::Neutral);
        assert_eq!(hbs.contribution, 0.0);
    }

    #[test]
    fn test_whr_leans_female() {
        let explanation = demo_explanation();
        let whr = explanation
            .influences
            .iter()
            .find(|inf| inf.feature == Feature::Whr)
            .unwrap();
        assert_eq!(whr.lean, Lean::Female);
    }

    #[test]
    fn test_passing_text() {
        let explanation = demo_explanation();
        let text = explanation.passing_text();
        assert!(text.starts_with("probability of passing as female: "));
        assert!(text.ends_with('%'));
        assert!(explanation.render_text().contains("BBHB"));
        assert_eq!(explanation.top(3).len(), 3);
        assert_eq!(explanation.top(50).len(), 11);
    }

    #[test]
    fn test_lean_from_contribution() {
        assert_eq!(Lean::from_contribution(0.2), Lean::Male);
        assert_eq!(Lean::from_contribution(-0.2), Lean::Female);
        assert_eq!(Lean::from_contribution(0.0), Lean::Neutral);
    }
}
