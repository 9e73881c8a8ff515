//! Headline scoring.

/// Turns a headline into a polarity score in [-1, 1].
pub trait HeadlineScorer: Send + Sync {
    fn score(&self, headline: &str) -> f64;
}

const POSITIVE: &[&str] = &[
    "beat", "beats", "boost", "boosts", "bullish", "climb", "climbs", "gain", "gains", "growth",
    "high", "jump", "jumps", "outperform", "profit", "profits", "rally", "rallies", "record",
    "rebound", "rise", "rises", "soar", "soars", "strong", "surge", "surges", "upgrade",
    "upgraded", "win", "wins",
];

const NEGATIVE: &[&str] = &[
    "bearish", "crash", "crashes", "cut", "cuts", "decline", "declines", "downgrade",
    "downgraded", "drop", "drops", "fall", "falls", "fear", "fears", "fraud", "lawsuit", "loss",
    "losses", "miss", "misses", "plunge", "plunges", "probe", "recall", "risk", "slump",
    "slumps", "tumble", "tumbles", "warning", "weak",
];

/// Word-list scorer for financial headlines.
///
/// The score is `(positive - negative) / (positive + negative)` over matched
/// words, and 0 for headlines with no matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconScorer;

impl HeadlineScorer for LexiconScorer {
    fn score(&self, headline: &str) -> f64 {
        let (mut positive, mut negative) = (0_u32, 0_u32);
        for word in headline
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let word = word.to_ascii_lowercase();
            if POSITIVE.contains(&word.as_str()) {
                positive += 1;
            } else if NEGATIVE.contains(&word.as_str()) {
                negative += 1;
            }
        }

        let matched = positive + negative;
        if matched == 0 {
            return 0.0;
        }
        (f64::from(positive) - f64::from(negative)) / f64::from(matched)
    }
}
