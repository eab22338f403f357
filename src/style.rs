// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Output head layouts.
//!
//! Two detection heads are in circulation and they disagree on row layout, on the
//! meaning of a class score and on the default confidence threshold. The layout is
//! therefore explicit configuration rather than something guessed from the tensor.

use std::fmt;
use std::str::FromStr;

/// Layout of one output row and the rule used to decode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecodeStyle {
    /// Direct box head: `cx, cy, w, h` in network pixels followed by one score per class.
    /// Scores are already probabilities.
    #[default]
    Direct,
    /// Distribution-focal-loss head: four `reg_max`-bin distributions (left, top, right,
    /// bottom) followed by one raw logit per class.
    Dfl {
        /// Number of bins per box side.
        reg_max: usize,
    },
}

impl DecodeStyle {
    /// Bins per side used by the common DFL export.
    pub const DEFAULT_REG_MAX: usize = 16;

    /// DFL head with the default 16 bins per side.
    #[must_use]
    pub const fn dfl() -> Self {
        Self::Dfl {
            reg_max: Self::DEFAULT_REG_MAX,
        }
    }

    /// Returns the name used in descriptors and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Dfl { .. } => "dfl",
        }
    }

    /// Number of leading values per row that describe the box.
    #[must_use]
    pub const fn box_values(&self) -> usize {
        match self {
            Self::Direct => 4,
            Self::Dfl { reg_max } => 4 * *reg_max,
        }
    }

    /// Total row width for a model with `num_classes` classes.
    #[must_use]
    pub const fn row_width(&self, num_classes: usize) -> usize {
        self.box_values() + num_classes
    }

    /// Class count implied by a row of `row_width` values, if the row is wide enough.
    #[must_use]
    pub const fn classes_for_width(&self, row_width: usize) -> Option<usize> {
        row_width.checked_sub(self.box_values())
    }

    /// Whether rows are decoded relative to grid anchors.
    #[must_use]
    pub const fn needs_grid(&self) -> bool {
        matches!(self, Self::Dfl { .. })
    }

    /// Confidence threshold paired with this head.
    ///
    /// Direct heads compare raw probabilities against 0.25; DFL heads compare the
    /// sigmoid of the best logit against 0.4.
    #[must_use]
    pub const fn default_threshold(&self) -> f32 {
        match self {
            Self::Direct => 0.25,
            Self::Dfl { .. } => 0.4,
        }
    }
}

impl fmt::Display for DecodeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Dfl { reg_max } => write!(f, "dfl:{reg_max}"),
        }
    }
}

impl FromStr for DecodeStyle {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (name, bins) = match lower.split_once(':') {
            Some((name, bins)) => (name, Some(bins)),
            None => (lower.as_str(), None),
        };

        match (name, bins) {
            ("direct" | "a" | "v8" | "yolov8", None) => Ok(Self::Direct),
            ("dfl" | "b" | "anchor-free", None) => Ok(Self::dfl()),
            ("dfl" | "b" | "anchor-free", Some(bins)) => match bins.trim().parse::<usize>() {
                Ok(reg_max) if reg_max > 0 => Ok(Self::Dfl { reg_max }),
                _ => Err(StyleParseError(s.to_string())),
            },
            _ => Err(StyleParseError(s.to_string())),
        }
    }
}

/// Exponential used by sigmoid and softmax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExpMode {
    /// `f32::exp`.
    #[default]
    Exact,
    /// Bit-level approximation, relative error below 1% (see
    /// [`fast_exp`](crate::postprocessing::fast_exp)).
    Fast,
}

impl ExpMode {
    /// Evaluate `e^x` in this mode.
    #[inline]
    #[must_use]
    pub fn exp(self, x: f32) -> f32 {
        match self {
            Self::Exact => x.exp(),
            Self::Fast => crate::postprocessing::fast_exp(x),
        }
    }
}

impl FromStr for ExpMode {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "fast" | "approx" => Ok(Self::Fast),
            _ => Err(StyleParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid style string.
#[derive(Debug, Clone)]
pub struct StyleParseError(String);

impl fmt::Display for StyleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value '{}', expected one of: direct, dfl, dfl:<bins>, exact, fast",
            self.0
        )
    }
}

impl std::error::Error for StyleParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_from_str() {
        assert_eq!("direct".parse::<DecodeStyle>().unwrap(), DecodeStyle::Direct);
        assert_eq!("A".parse::<DecodeStyle>().unwrap(), DecodeStyle::Direct);
        assert_eq!("dfl".parse::<DecodeStyle>().unwrap(), DecodeStyle::dfl());
        assert_eq!(
            "dfl:8".parse::<DecodeStyle>().unwrap(),
            DecodeStyle::Dfl { reg_max: 8 }
        );
        assert!("dfl:0".parse::<DecodeStyle>().is_err());
        assert!("direct:4".parse::<DecodeStyle>().is_err());
        assert!("segment".parse::<DecodeStyle>().is_err());
    }

    #[test]
    fn test_style_display_round_trip() {
        for style in [DecodeStyle::Direct, DecodeStyle::dfl(), DecodeStyle::Dfl { reg_max: 7 }] {
            assert_eq!(style.to_string().parse::<DecodeStyle>().unwrap(), style);
        }
    }

    #[test]
    fn test_row_widths() {
        assert_eq!(DecodeStyle::Direct.row_width(80), 84);
        assert_eq!(DecodeStyle::dfl().row_width(80), 144);
        assert_eq!(DecodeStyle::dfl().classes_for_width(144), Some(80));
        assert_eq!(DecodeStyle::dfl().classes_for_width(10), None);
        assert!(DecodeStyle::dfl().needs_grid());
        assert!(!DecodeStyle::Direct.needs_grid());
    }

    #[test]
    fn test_paired_thresholds() {
        assert!((DecodeStyle::Direct.default_threshold() - 0.25).abs() < f32::EPSILON);
        assert!((DecodeStyle::dfl().default_threshold() - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_exp_mode() {
        assert_eq!("fast".parse::<ExpMode>().unwrap(), ExpMode::Fast);
        assert!((ExpMode::Exact.exp(1.0) - std::f32::consts::E).abs() < 1e-6);
    }
}
