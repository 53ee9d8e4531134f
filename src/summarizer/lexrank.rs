//! Extractive LexRank summarization.
//!
//! Sentences are nodes in a TF-IDF cosine-similarity graph; edges above a
//! fixed threshold are kept and degree-normalized, and power iteration gives
//! each sentence a centrality score. The summary is the top-scoring sentences
//! in ranked order, copied verbatim from the source text.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

const SIMILARITY_THRESHOLD: f64 = 0.1;
const EPSILON: f64 = 0.1;
const MAX_ITERATIONS: usize = 1000;

/// Lowercase abbreviations (without the trailing dot) that do not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig", "vol",
    "approx", "dept", "est", "inc", "ltd", "co", "jan", "feb", "mar", "apr", "jun", "jul", "aug",
    "sep", "sept", "oct", "nov", "dec", "u.s", "a.m", "p.m", "cf", "al",
];

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}]+)?").expect("valid word regex"))
}

fn blank_line_regex() -> &'static Regex {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    BLANK.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid blank line regex"))
}

/// Split English text into sentences.
///
/// Blank lines always end a sentence, and lines written entirely in capitals
/// are headings that never become sentences. Within a block, a boundary is
/// `.`, `!` or `?` (plus any closing quotes/brackets) followed by whitespace,
/// unless the dot belongs to an abbreviation or an initial. Returned slices
/// are trimmed views into `text`.
pub fn split_sentences(text: &str) -> Vec<&str> {
    blank_line_regex()
        .split(text)
        .flat_map(body_blocks)
        .flat_map(split_block)
        .collect()
}

fn is_heading(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

/// Contiguous runs of non-heading lines within one paragraph.
fn body_blocks(paragraph: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in paragraph.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if is_heading(line) {
            let block = &paragraph[start..line_start];
            if !block.trim().is_empty() {
                blocks.push(block);
            }
            start = offset;
        }
    }
    let block = &paragraph[start..];
    if !block.trim().is_empty() {
        blocks.push(block);
    }
    blocks
}

fn split_block(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    let mut i = 0;
    while i < chars.len() {
        let (_, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            // Absorb runs like "?!" or "..." and trailing closers like `."`
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '.' | '!' | '?') {
                j += 1;
            }
            while j < chars.len() && matches!(chars[j].1, '"' | '\'' | ')' | ']' | '”' | '’') {
                j += 1;
            }
            let at_whitespace = j < chars.len() && chars[j].1.is_whitespace();
            let end = chars.get(j).map_or(text.len(), |&(at, _)| at);
            let continues = c == '.'
                && j == i + 1
                && is_abbreviation(&text[start..chars[i].0], &text[end..]);
            if at_whitespace && !continues {
                let s = text[start..end].trim();
                if !s.is_empty() {
                    sentences.push(s);
                }
                start = end;
            }
            i = j;
        } else {
            i += 1;
        }
    }

    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }
    sentences
}

/// Whether the dot between `before` and `after` belongs to an abbreviation
/// ("Dr.", "No. 5") or an initial ("J. R. Tolkien", "John F. Kennedy").
fn is_abbreviation(before: &str, after: &str) -> bool {
    let mut previous = before
        .split(|c: char| c.is_whitespace() || c == '(')
        .filter(|t| !t.is_empty())
        .rev();
    let Some(token) = previous.next() else {
        return false;
    };
    let next = after.split_whitespace().next().unwrap_or("");

    if token.eq_ignore_ascii_case("no") {
        return next.starts_with(|c: char| c.is_ascii_digit());
    }

    let mut letters = token.chars();
    if let (Some(first), None) = (letters.next(), letters.next()) {
        if !first.is_uppercase() || first == 'I' {
            return false;
        }
        let prev = previous.next().unwrap_or("");
        return next.starts_with(char::is_uppercase)
            && (is_initial(next) || is_initial(prev) || is_capitalized(prev));
    }

    ABBREVIATIONS.contains(&token.to_lowercase().as_str())
}

/// A single capital followed by a dot, like "R.".
fn is_initial(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_uppercase()
    )
}

/// A name-like word: leading capital, then lowercase.
fn is_capitalized(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next().is_some_and(char::is_uppercase) && chars.any(char::is_lowercase)
}

fn words(sentence: &str) -> Vec<String> {
    word_regex()
        .find_iter(sentence)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Term frequency normalized by the most frequent term of the sentence.
fn term_frequencies(words: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for w in words {
        *counts.entry(w.as_str()).or_insert(0.0) += 1.0;
    }
    let max = counts.values().copied().fold(1.0, f64::max);
    for v in counts.values_mut() {
        *v /= max;
    }
    counts
}

fn inverse_document_frequencies<'a>(docs: &[HashMap<&'a str, f64>]) -> HashMap<&'a str, f64> {
    let n = docs.len() as f64;
    let mut df: HashMap<&str, f64> = HashMap::new();
    for doc in docs {
        for term in doc.keys() {
            *df.entry(*term).or_insert(0.0) += 1.0;
        }
    }
    df.into_iter()
        .map(|(term, count)| (term, (n / (1.0 + count)).ln()))
        .collect()
}

fn idf_modified_cosine(
    a: &HashMap<&str, f64>,
    b: &HashMap<&str, f64>,
    idf: &HashMap<&str, f64>,
) -> f64 {
    let weight = |term: &str| idf.get(term).copied().unwrap_or(0.0);

    let numerator: f64 = a
        .iter()
        .filter_map(|(term, tf_a)| b.get(term).map(|tf_b| tf_a * tf_b * weight(*term).powi(2)))
        .sum();

    let norm = |doc: &HashMap<&str, f64>| {
        doc.iter()
            .map(|(term, tf)| (tf * weight(*term)).powi(2))
            .sum::<f64>()
            .sqrt()
    };
    let denominator = norm(a) * norm(b);

    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Stationary distribution of the (row-stochastic) similarity matrix.
fn power_method(matrix: &[Vec<f64>]) -> Vec<f64> {
    let n = matrix.len();
    let mut p = vec![1.0 / n as f64; n];

    for _ in 0..MAX_ITERATIONS {
        let next: Vec<f64> = (0..n)
            .map(|j| (0..n).map(|i| matrix[i][j] * p[i]).sum())
            .collect();
        let delta = next
            .iter()
            .zip(&p)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        p = next;
        if delta < EPSILON {
            break;
        }
    }
    p
}

/// Centrality score for each sentence, in document order.
pub fn rate_sentences(sentences: &[&str]) -> Vec<f64> {
    let tokenized: Vec<Vec<String>> = sentences.iter().map(|s| words(s)).collect();
    let tfs: Vec<HashMap<&str, f64>> = tokenized.iter().map(|w| term_frequencies(w)).collect();
    let idf = inverse_document_frequencies(&tfs);

    let n = sentences.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        let mut degree = 0.0;
        for j in 0..n {
            if idf_modified_cosine(&tfs[i], &tfs[j], &idf) > SIMILARITY_THRESHOLD {
                matrix[i][j] = 1.0;
                degree += 1.0;
            }
        }
        let degree = if degree == 0.0 { 1.0 } else { degree };
        for cell in matrix[i].iter_mut() {
            *cell /= degree;
        }
    }

    power_method(&matrix)
}

/// Select up to `count` sentences by LexRank score, highest first.
///
/// Ties keep document order. Duplicate sentences are emitted once.
pub fn summarize(text: &str, count: usize) -> Vec<&str> {
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return sentences;
    }

    let scores = rate_sentences(&sentences);
    let mut ranked: Vec<usize> = (0..sentences.len()).collect();
    ranked.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .map(|i| sentences[i])
        .filter(|s| seen.insert(*s))
        .take(count)
        .collect()
}
