use kb_storage::query::{
	ChunkQuery, Condition, Order, Page, QueryVector, ScopeColumn, Similarity, TextColumn,
};

/// Tenant and collection every statement of a search is confined to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchScope {
	pub collection_id: String,
	pub user_id: String,
}
impl SearchScope {
	/// `collection_id = ? AND user_id = ? [AND rest]`.
	pub(crate) fn confine(&self, rest: Option<Condition>) -> Condition {
		let mut items = vec![
			Condition::Equals {
				column: ScopeColumn::CollectionId,
				value: self.collection_id.clone(),
			},
			Condition::Equals { column: ScopeColumn::UserId, value: self.user_id.clone() },
		];

		items.extend(rest);

		Condition::All(items)
	}
}

/// Semantic-or-lexical match over the scope, best similarity first.
///
/// With no keywords the lexical arm is omitted and only the similarity threshold filters.
pub fn hybrid_query(
	scope: &SearchScope,
	vector: QueryVector,
	keywords: &[String],
	columns: &[TextColumn],
	similarity_threshold: f64,
	page: Page,
) -> ChunkQuery {
	let semantic =
		Condition::SimilarityAbove { vector: vector.clone(), threshold: similarity_threshold };
	let matching = match keyword_clause(keywords, columns) {
		Some(lexical) => Condition::Any(vec![semantic, lexical]),
		None => semantic,
	};

	ChunkQuery {
		predicate: scope.confine(Some(matching)),
		similarity: Similarity::Vector(vector),
		order: Order::SimilarityDesc,
		page,
	}
}

/// One `Contains` per keyword and column, OR-ed. `None` when there is nothing to match.
pub(crate) fn keyword_clause(keywords: &[String], columns: &[TextColumn]) -> Option<Condition> {
	let terms = keywords
		.iter()
		.flat_map(|keyword| {
			columns
				.iter()
				.map(move |column| Condition::Contains { column: *column, needle: keyword.clone() })
		})
		.collect::<Vec<_>>();

	if terms.is_empty() { None } else { Some(Condition::Any(terms)) }
}
