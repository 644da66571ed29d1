use kb_storage::query::{ChunkQuery, Order, Page, Similarity, TextColumn};

use crate::search::hybrid::{self, SearchScope};

/// Keyword-only query used when the hybrid statement fails.
///
/// Every row carries `fixed_similarity`. With no keywords the whole scope matches, bounded by
/// `page`.
pub fn fallback_query(
	scope: &SearchScope,
	keywords: &[String],
	columns: &[TextColumn],
	fixed_similarity: f32,
	page: Page,
) -> ChunkQuery {
	ChunkQuery {
		predicate: scope.confine(hybrid::keyword_clause(keywords, columns)),
		similarity: Similarity::Fixed(fixed_similarity),
		order: Order::DocumentPosition,
		page,
	}
}
