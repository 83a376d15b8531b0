use serde::{Deserialize, Serialize};

/// One ranked candidate for an input name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Standardized name.
    pub label: String,
    /// Softmax probability in `[0.0, 1.0]`.
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// `true` if the confidence is below the caller's acceptance threshold.
    #[must_use]
    pub fn needs_review(&self, threshold: f32) -> bool {
        self.confidence < threshold
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.3})", self.label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_review() {
        let prediction = Prediction::new("Parotid_L", 0.62);
        assert!(prediction.needs_review(0.7));
        assert!(!prediction.needs_review(0.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(Prediction::new("GTV", 0.9).to_string(), "GTV (0.900)");
    }
}
