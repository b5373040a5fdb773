use std::fmt;

/// Instrument integration-time setting, displayed as a coarse named speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedTier {
    Fast,
    Medium,
    Slow,
    HighAccuracy,
}

impl SpeedTier {
    /// Map a device-reported NPLC value onto a tier. Exact comparison only:
    /// the firmware echoes the four canonical values verbatim, and a value
    /// that matches no tier leaves the speed control untouched.
    pub fn from_nplc(nplc: f64) -> Option<Self> {
        if nplc == 0.01 {
            Some(SpeedTier::Fast)
        } else if nplc == 0.1 {
            Some(SpeedTier::Medium)
        } else if nplc == 1.0 {
            Some(SpeedTier::Slow)
        } else if nplc == 10.0 {
            Some(SpeedTier::HighAccuracy)
        } else {
            None
        }
    }

    pub fn nplc(self) -> f64 {
        match self {
            SpeedTier::Fast => 0.01,
            SpeedTier::Medium => 0.1,
            SpeedTier::Slow => 1.0,
            SpeedTier::HighAccuracy => 10.0,
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpeedTier::Fast => "Fast",
            SpeedTier::Medium => "Medium",
            SpeedTier::Slow => "Slow",
            SpeedTier::HighAccuracy => "High Accuracy",
        };
        f.write_str(label)
    }
}

const PREFIXES: [(i32, &str); 17] = [
    (-24, "y"),
    (-21, "z"),
    (-18, "a"),
    (-15, "f"),
    (-12, "p"),
    (-9, "n"),
    (-6, "u"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
    (12, "T"),
    (15, "P"),
    (18, "E"),
    (21, "Z"),
    (24, "Y"),
];

/// Format a value in engineering notation with an SI prefix: `2.0e6` becomes
/// `"2M"`, `1.5e-9` becomes `"1.5n"`. `digits` is the maximum number of
/// decimals; trailing zeros are trimmed. Magnitudes outside the prefix table
/// fall back to plain scientific notation.
pub fn eng_notation(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let exponent = (value.abs().log10().floor() as i32).div_euclid(3) * 3;
    let Some((_, prefix)) = PREFIXES.iter().find(|(e, _)| *e == exponent) else {
        return format!("{value:e}");
    };

    let scaled = value / 10f64.powi(exponent);
    let mut text = format!("{scaled:.digits$}");
    if text.contains('.') {
        text.truncate(text.trim_end_matches('0').trim_end_matches('.').len());
    }
    text.push_str(prefix);
    text
}
