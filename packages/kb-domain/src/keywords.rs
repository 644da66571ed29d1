//! Lexical keyword extraction for chunk search queries.
//!
//! Candidate terms are the open-class words of the query (nouns, verbs, adjectives and the
//! like), approximated by dropping closed-class English words from the Unicode word
//! segmentation of the NFKC-normalized text.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Terms with fewer characters than this are never keywords.
pub const MIN_KEYWORD_CHARS: usize = 3;

/// Closed-class words. Must stay sorted; lookups use binary search.
const STOP_WORDS: &[&str] = &[
	"about",
	"above",
	"after",
	"again",
	"against",
	"all",
	"also",
	"among",
	"and",
	"any",
	"are",
	"because",
	"been",
	"before",
	"being",
	"below",
	"between",
	"both",
	"but",
	"can",
	"cannot",
	"could",
	"did",
	"does",
	"doing",
	"down",
	"during",
	"each",
	"either",
	"else",
	"every",
	"few",
	"for",
	"from",
	"further",
	"had",
	"has",
	"have",
	"having",
	"her",
	"here",
	"hers",
	"herself",
	"him",
	"himself",
	"his",
	"how",
	"however",
	"into",
	"its",
	"itself",
	"just",
	"may",
	"might",
	"mine",
	"more",
	"most",
	"much",
	"must",
	"myself",
	"neither",
	"nor",
	"not",
	"off",
	"once",
	"only",
	"other",
	"ought",
	"our",
	"ours",
	"ourselves",
	"out",
	"over",
	"own",
	"same",
	"shall",
	"she",
	"should",
	"some",
	"such",
	"than",
	"that",
	"the",
	"their",
	"theirs",
	"them",
	"themselves",
	"then",
	"there",
	"these",
	"they",
	"this",
	"those",
	"through",
	"too",
	"under",
	"until",
	"upon",
	"very",
	"was",
	"were",
	"what",
	"when",
	"where",
	"whether",
	"which",
	"while",
	"who",
	"whom",
	"whose",
	"why",
	"will",
	"with",
	"within",
	"without",
	"would",
	"yet",
	"you",
	"your",
	"yours",
	"yourself",
	"yourselves",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeywordSource {
	/// Word segmentation with closed-class filtering.
	Tagged,
	/// Whitespace split used when tagging failed.
	Whitespace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaggingFailure {
	DisallowedControlChar,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
	pub keywords: Vec<String>,
	pub source: KeywordSource,
	pub failure: Option<TaggingFailure>,
}

/// Returns at most `max_keywords` lower-cased, de-duplicated keywords in first-seen order.
/// Never fails; a tagging failure degrades to [`whitespace_keywords`].
pub fn extract(text: &str, max_keywords: usize) -> Vec<String> {
	extract_detailed(text, max_keywords).keywords
}

pub fn extract_detailed(text: &str, max_keywords: usize) -> Extraction {
	match tagged_keywords(text, max_keywords) {
		Ok(keywords) => Extraction { keywords, source: KeywordSource::Tagged, failure: None },
		Err(failure) => Extraction {
			keywords: whitespace_keywords(text, max_keywords),
			source: KeywordSource::Whitespace,
			failure: Some(failure),
		},
	}
}

pub fn tagged_keywords(text: &str, max_keywords: usize) -> Result<Vec<String>, TaggingFailure> {
	let normalized: String = text.nfkc().collect();

	if contains_disallowed_controls(normalized.as_str()) {
		return Err(TaggingFailure::DisallowedControlChar);
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for word in normalized.unicode_words() {
		if out.len() >= max_keywords {
			break;
		}

		let lowered = word.to_lowercase();
		let term = strip_possessive(lowered.as_str());

		// Remaining apostrophes mark contractions ("don't", "we're"), which are closed-class.
		if term.contains(['\'', '\u{2019}']) {
			continue;
		}
		if !is_candidate(term) {
			continue;
		}
		if seen.insert(term.to_string()) {
			out.push(term.to_string());
		}
	}

	Ok(out)
}

/// Splits on whitespace and keeps tokens longer than two characters.
pub fn whitespace_keywords(text: &str, max_keywords: usize) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in text.split_whitespace() {
		if out.len() >= max_keywords {
			break;
		}

		let term: String =
			token.chars().filter(|ch| !ch.is_control()).flat_map(char::to_lowercase).collect();

		if term.chars().count() < MIN_KEYWORD_CHARS {
			continue;
		}
		if seen.insert(term.clone()) {
			out.push(term);
		}
	}

	out
}

pub fn is_stop_word(term: &str) -> bool {
	STOP_WORDS.binary_search(&term).is_ok()
}

fn is_candidate(term: &str) -> bool {
	term.chars().count() >= MIN_KEYWORD_CHARS && !is_stop_word(term)
}

fn strip_possessive(word: &str) -> &str {
	word.strip_suffix("'s").or_else(|| word.strip_suffix("\u{2019}s")).unwrap_or(word)
}

fn contains_disallowed_controls(input: &str) -> bool {
	input.chars().any(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
}
