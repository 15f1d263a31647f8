//! Keyword-frequency genre classification
//!
//! Each keyword scores 2 when it appears in the title and 1 when it appears
//! in the body (case-insensitive substring match). The highest score wins;
//! ties go to the genre listed first in [`KEYWORDS`]; no hits at all yields
//! [`Genre::General`].

use crate::models::Genre;

/// Keyword sets in tie-break order
pub const KEYWORDS: &[(Genre, &[&str])] = &[
    (
        Genre::AiMl,
        &[
            "ai",
            "machine learning",
            "artificial intelligence",
            "neural network",
            "deep learning",
            "llm",
        ],
    ),
    (
        Genre::Cybersecurity,
        &["security", "cyber", "hack", "breach", "privacy", "encryption", "threat"],
    ),
    (
        Genre::Coding,
        &["code", "programming", "developer", "software", "framework", "library", "github"],
    ),
    (
        Genre::EmergingTech,
        &["blockchain", "web3", "metaverse", "vr", "ar", "quantum", "iot"],
    ),
    (
        Genre::TechNews,
        &["announced", "released", "launched", "update", "version", "feature", "company"],
    ),
];

const TITLE_WEIGHT: u32 = 2;
const BODY_WEIGHT: u32 = 1;

/// Score of every keyword genre for the given text, in [`KEYWORDS`] order
pub fn scores(title: &str, body: &str) -> Vec<(Genre, u32)> {
    let title = title.to_lowercase();
    let body = body.to_lowercase();

    KEYWORDS
        .iter()
        .map(|(genre, words)| {
            let score = words
                .iter()
                .map(|word| {
                    let mut s = 0;
                    if title.contains(word) {
                        s += TITLE_WEIGHT;
                    }
                    if body.contains(word) {
                        s += BODY_WEIGHT;
                    }
                    s
                })
                .sum();
            (*genre, score)
        })
        .collect()
}

/// Pick the genre for a generated post
pub fn classify(title: &str, body: &str) -> Genre {
    let mut best = (Genre::General, 0);
    for (genre, score) in scores(title, body) {
        if score > best.1 {
            best = (genre, score);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keywords_is_general() {
        assert_eq!(classify("Weekly digest", "<p>Nothing to see</p>"), Genre::General);
        assert_eq!(classify("", ""), Genre::General);
    }

    #[test]
    fn test_title_outweighs_body() {
        // "security" in the title (2) beats "github" in the body (1)
        assert_eq!(classify("Security roundup", "<p>mirrored on github</p>"), Genre::Cybersecurity);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(classify("QUANTUM Supremacy", ""), Genre::EmergingTech);
    }

    #[test]
    fn test_ties_keep_earlier_genre() {
        // "llm" and "code" both score 2 from the title; ai-ml is listed first
        let all = scores("LLM writes code", "");
        assert_eq!(all[0], (Genre::AiMl, 2));
        assert_eq!(all[2], (Genre::Coding, 2));
        assert_eq!(classify("LLM writes code", ""), Genre::AiMl);
    }

    #[test]
    fn test_substring_matches_count() {
        // "ar" matches inside "smartphone"; "ai" matches inside "said"
        let all = scores("Smartphone", "The company said so");
        let emerging = all.iter().find(|(g, _)| *g == Genre::EmergingTech).unwrap();
        assert_eq!(emerging.1, 2);
        let ai = all.iter().find(|(g, _)| *g == Genre::AiMl).unwrap();
        assert_eq!(ai.1, 1);
    }

    #[test]
    fn test_body_hits_accumulate() {
        let body = "<p>A breach exposed encryption keys; the threat actors hacked in.</p>";
        assert_eq!(classify("Incident report", body), Genre::Cybersecurity);
    }
}
