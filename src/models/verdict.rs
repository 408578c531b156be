use std::fmt;

use serde::{Deserialize, Serialize};

/// Verdict as the analysis service reports it, before any normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawVerdict {
    pub claim: String,
    /// Older backends call this field `percentage`. Read as a float so
    /// fractional or huge scores still clamp instead of failing to parse.
    #[serde(alias = "percentage")]
    pub truth_score: f64,
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub claim: String,
    pub truth_score: u8,
    pub summary: String,
    pub sources: Vec<String>,
}

impl Verdict {
    pub const MAX_SCORE: u8 = 100;

    /// Rounds and clamps the score into [0, 100]; the service is trusted for
    /// nothing else. A NaN score counts as 0.
    pub fn from_raw(raw: RawVerdict) -> Self {
        let score = if raw.truth_score.is_nan() {
            0.0
        } else {
            raw.truth_score.round()
        };
        let truth_score = score.clamp(0.0, f64::from(Self::MAX_SCORE)) as u8;
        Self {
            claim: raw.claim,
            truth_score,
            summary: raw.summary,
            sources: raw.sources,
        }
    }

    pub fn label(&self) -> TruthLabel {
        TruthLabel::for_score(self.truth_score)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TruthLabel {
    LikelyTrue,
    Uncertain,
    LikelyFalse,
}

impl TruthLabel {
    pub fn for_score(score: u8) -> Self {
        match score {
            80.. => TruthLabel::LikelyTrue,
            50..=79 => TruthLabel::Uncertain,
            _ => TruthLabel::LikelyFalse,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TruthLabel::LikelyTrue => "Likely True",
            TruthLabel::Uncertain => "Uncertain",
            TruthLabel::LikelyFalse => "Likely False",
        }
    }
}

impl fmt::Display for TruthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(score: f64) -> RawVerdict {
        RawVerdict {
            claim: "X".into(),
            truth_score: score,
            summary: "s".into(),
            sources: vec![],
        }
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(Verdict::from_raw(raw(130.0)).truth_score, 100);
        assert_eq!(Verdict::from_raw(raw(-5.0)).truth_score, 0);
        assert_eq!(Verdict::from_raw(raw(42.0)).truth_score, 42);
        assert_eq!(Verdict::from_raw(raw(f64::NAN)).truth_score, 0);
    }

    #[test]
    fn fractional_and_huge_scores_still_parse() {
        let fractional: RawVerdict =
            serde_json::from_str(r#"{"claim":"c","truthScore":72.5,"summary":"s"}"#).unwrap();
        assert_eq!(Verdict::from_raw(fractional).truth_score, 73);

        let huge: RawVerdict = serde_json::from_str(
            r#"{"claim":"c","truthScore":99999999999999999999999,"summary":"s"}"#,
        )
        .unwrap();
        assert_eq!(Verdict::from_raw(huge).truth_score, 100);
    }

    #[test]
    fn label_boundaries() {
        assert_eq!(TruthLabel::for_score(100), TruthLabel::LikelyTrue);
        assert_eq!(TruthLabel::for_score(80), TruthLabel::LikelyTrue);
        assert_eq!(TruthLabel::for_score(79), TruthLabel::Uncertain);
        assert_eq!(TruthLabel::for_score(50), TruthLabel::Uncertain);
        assert_eq!(TruthLabel::for_score(49), TruthLabel::LikelyFalse);
        assert_eq!(TruthLabel::for_score(0).to_string(), "Likely False");
    }

    #[test]
    fn accepts_legacy_percentage_field() {
        let raw: RawVerdict = serde_json::from_str(
            r#"{"claim":"c","percentage":23,"summary":"s","sources":["Reuters"]}"#,
        )
        .unwrap();
        assert_eq!(raw.truth_score, 23.0);
        assert_eq!(raw.sources, vec!["Reuters".to_string()]);
    }
}
