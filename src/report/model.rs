// Report data model

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Fixed loudness bands used for the distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseBand {
    Quiet,
    Moderate,
    Loud,
    Harmful,
}

impl NoiseBand {
    pub const ALL: [NoiseBand; 4] = [
        NoiseBand::Quiet,
        NoiseBand::Moderate,
        NoiseBand::Loud,
        NoiseBand::Harmful,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseBand::Quiet => "quiet",
            NoiseBand::Moderate => "moderate",
            NoiseBand::Loud => "loud",
            NoiseBand::Harmful => "harmful",
        }
    }
}

impl fmt::Display for NoiseBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the level over the session (second half vs first half)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Qualitative exposure verdict, most severe last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    MostlySafe,
    SafeWithPeaks,
    OftenLoud,
    FrequentlyHarmful,
}

impl Verdict {
    /// Human-readable conclusion shown to the citizen
    pub fn conclusion(&self) -> &'static str {
        match self {
            Verdict::MostlySafe => "Noise levels stayed mostly within safe limits.",
            Verdict::SafeWithPeaks => {
                "Noise levels were mostly within safe limits, with occasional harmful peaks."
            }
            Verdict::OftenLoud => {
                "Noise levels were often loud; prolonged exposure may cause discomfort."
            }
            Verdict::FrequentlyHarmful => {
                "Noise levels were frequently above recommended exposure limits."
            }
        }
    }
}

/// Aggregated summary of one completed session
///
/// Built once by [`ReportAssembler`](super::ReportAssembler) and owned by the
/// caller afterwards; it holds no reference back to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: SessionId,
    pub average_db: f64,
    pub peak_db: f64,
    pub min_db: f64,
    pub duration_ms: u64,
    pub reading_count: usize,
    /// Every band is present, zero counts included
    pub distribution: BTreeMap<NoiseBand, usize>,
    pub trend: Trend,
    pub verdict: Verdict,
    pub conclusion: String,
}

impl Report {
    pub fn band_count(&self, band: NoiseBand) -> usize {
        self.distribution.get(&band).copied().unwrap_or(0)
    }

    /// Share of readings in `band`, in `[0, 1]`
    pub fn band_share(&self, band: NoiseBand) -> f64 {
        if self.reading_count == 0 {
            return 0.0;
        }
        self.band_count(band) as f64 / self.reading_count as f64
    }
}
