//! Keyword and extractive-summary digest of extracted text.
//!
//! Keywords are the most frequent terms after stop-word removal: lower-cased
//! ASCII words and CJK character bigrams. Summary sentences are scored by the
//! keyword frequencies they contain and reported in their original order.
//! Ties always resolve towards the earlier occurrence, so the digest of a
//! given text never changes between runs.

use core_types::config::AnalysisConfig;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Han}A-Za-z0-9\s,.!?，。！？]").unwrap());
static TERMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+|\p{Han}+").unwrap());
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?。！？\n]+").unwrap());

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "if", "in", "into", "is", "it", "its", "may", "more", "most", "no",
    "not", "of", "on", "or", "other", "our", "she", "should", "so", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "up", "was", "we",
    "were", "what", "when", "which", "who", "will", "with", "would", "you", "your", "的", "了",
    "和", "是", "在", "有", "与", "及", "或", "也", "就", "都", "而", "我们", "他们", "一个",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    pub keywords: Vec<String>,
    pub summary: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    keywords_limit: usize,
    summary_sentences: usize,
    stop_words: HashSet<&'static str>,
}

impl Analyzer {
    pub fn new(keywords_limit: usize, summary_sentences: usize) -> Self {
        Self {
            keywords_limit,
            summary_sentences,
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        Self::new(cfg.keywords_limit, cfg.summary_sentences)
    }

    pub fn analyze(&self, text: &str) -> Digest {
        let cleaned = NOISE.replace_all(text, "");
        let frequencies = self.term_frequencies(&cleaned);
        let keywords = top_by_count(&frequencies, self.keywords_limit);
        let summary = self.summarize(&cleaned, &frequencies);
        Digest { keywords, summary }
    }

    /// Term counts plus first-seen position of each term.
    fn term_frequencies(&self, text: &str) -> HashMap<String, (usize, usize)> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, term) in self.terms(text).into_iter().enumerate() {
            counts.entry(term).or_insert((0, position)).0 += 1;
        }
        counts
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for m in TERMS.find_iter(text) {
            let run = m.as_str();
            if run.is_ascii() {
                let word = run.to_ascii_lowercase();
                if word.len() > 1
                    && !word.bytes().all(|b| b.is_ascii_digit())
                    && !self.stop_words.contains(word.as_str())
                {
                    out.push(word);
                }
                continue;
            }
            let chars: Vec<char> = run.chars().collect();
            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                if !self.stop_words.contains(bigram.as_str()) {
                    out.push(bigram);
                }
            }
        }
        out
    }

    fn summarize(&self, text: &str, frequencies: &HashMap<String, (usize, usize)>) -> Vec<String> {
        let sentences: Vec<&str> = SENTENCE_END
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut scored: Vec<(usize, usize)> = sentences
            .iter()
            .enumerate()
            .map(|(index, sentence)| {
                let score = self
                    .terms(sentence)
                    .iter()
                    .filter_map(|t| frequencies.get(t).map(|(count, _)| *count))
                    .sum();
                (index, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.summary_sentences);
        scored.sort_unstable_by_key(|(index, _)| *index);

        scored
            .into_iter()
            .map(|(index, _)| sentences[index].to_string())
            .collect()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

fn top_by_count(frequencies: &HashMap<String, (usize, usize)>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, &(usize, usize))> = frequencies.iter().collect();
    ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));
    ranked.into_iter().take(limit).map(|(term, _)| term.clone()).collect()
}
