//! Keyword-based sentiment scoring for headlines and post titles.
//!
//! A deliberately small financial lexicon: each text contributes the
//! normalised difference of bullish vs bearish keyword hits, and a source's
//! score is the mean over its texts, clamped to [-1, 1].

const BULLISH: &[&str] = &[
    "beat", "beats", "surge", "surges", "soar", "soars", "rally", "rallies", "record", "upgrade",
    "upgraded", "outperform", "growth", "profit", "profits", "gain", "gains", "bullish", "buy",
    "strong", "jump", "jumps", "breakout", "raises", "raised", "exceeds", "tops",
];

const BEARISH: &[&str] = &[
    "miss", "misses", "plunge", "plunges", "sink", "sinks", "crash", "crashes", "fall", "falls",
    "downgrade", "downgraded", "underperform", "loss", "losses", "lawsuit", "probe", "recall",
    "bearish", "sell", "weak", "drop", "drops", "cuts", "cut", "warns", "warning", "fraud",
    "bankruptcy", "layoffs",
];

/// Scores a single text in [-1, 1]. Texts with no lexicon hits score 0.
#[must_use]
pub fn score_text(text: &str) -> f64 {
    let mut bullish = 0u32;
    let mut bearish = 0u32;

    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_ascii_lowercase();
        if BULLISH.contains(&word.as_str()) {
            bullish += 1;
        } else if BEARISH.contains(&word.as_str()) {
            bearish += 1;
        }
    }

    let total = bullish + bearish;
    if total == 0 {
        0.0
    } else {
        (f64::from(bullish) - f64::from(bearish)) / f64::from(total)
    }
}

/// Mean score over a collection of texts, clamped to [-1, 1].
/// Empty input scores 0.
#[must_use]
pub fn score_texts<'a, I>(texts: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sum = 0.0;
    let mut count = 0u32;
    for text in texts {
        sum += score_text(text);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        (sum / f64::from(count)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullish_headline_scores_positive() {
        assert!(score_text("NVDA beats estimates, shares surge to record") > 0.0);
    }

    #[test]
    fn bearish_headline_scores_negative() {
        assert!(score_text("Chipmaker warns of weak demand, shares plunge") < 0.0);
    }

    #[test]
    fn mixed_headline_nets_out() {
        let score = score_text("Stock falls after record profit");
        // one bearish (falls), two bullish (record, profit) -> 1/3
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn neutral_headline_scores_zero() {
        assert_eq!(score_text("Company schedules annual shareholder meeting"), 0.0);
    }

    #[test]
    fn matching_is_case_insensitive_and_word_bounded() {
        assert!(score_text("SHARES SURGE") > 0.0);
        // "gainsborough" must not match "gains"
        assert_eq!(score_text("Gainsborough museum opens"), 0.0);
    }

    #[test]
    fn mean_over_texts() {
        let score = score_texts(["shares surge", "stock plunges"]);
        assert_eq!(score, 0.0);
        assert_eq!(score_texts(std::iter::empty::<&str>()), 0.0);
    }
}
