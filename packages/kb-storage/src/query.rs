//! Query descriptors for the `document_chunks` table.
//!
//! A [`ChunkQuery`] holds one predicate tree that is projected either into a `COUNT(*)` or
//! into the paged, scored row select. Bind parameters are appended by the SQL builder while
//! the tree is walked, so placeholder numbering never has to be computed by hand.

use std::sync::Arc;

use sqlx::{Postgres, QueryBuilder};

use crate::{Error, Result};

const SELECT_COLUMNS: &str = "\
SELECT
	id,
	document_id,
	user_id,
	product_id,
	collection_id,
	chunk_index,
	total_chunks,
	chunk_content AS content,
	filename,
	file_url,
	document_title,
	collection_name,
	";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeColumn {
	CollectionId,
	UserId,
}
impl ScopeColumn {
	pub fn as_sql(self) -> &'static str {
		match self {
			Self::CollectionId => "collection_id",
			Self::UserId => "user_id",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextColumn {
	Content,
	DocumentTitle,
	Filename,
	/// JSON keyword arrays, matched against their text form.
	ChunkKeywords,
	DocumentKeywords,
}
impl TextColumn {
	pub fn as_sql(self) -> &'static str {
		match self {
			Self::Content => "chunk_content",
			Self::DocumentTitle => "document_title",
			Self::Filename => "filename",
			Self::ChunkKeywords => "COALESCE(chunk_keywords::text, '')",
			Self::DocumentKeywords => "COALESCE(document_keywords::text, '')",
		}
	}
}
impl From<kb_config::KeywordColumn> for TextColumn {
	fn from(column: kb_config::KeywordColumn) -> Self {
		match column {
			kb_config::KeywordColumn::Content => Self::Content,
			kb_config::KeywordColumn::DocumentTitle => Self::DocumentTitle,
			kb_config::KeywordColumn::Filename => Self::Filename,
			kb_config::KeywordColumn::ChunkKeywords => Self::ChunkKeywords,
			kb_config::KeywordColumn::DocumentKeywords => Self::DocumentKeywords,
		}
	}
}

/// Query embedding shared between the predicate and the similarity projection.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryVector(Arc<[f32]>);
impl QueryVector {
	pub fn new(values: Vec<f32>) -> Self {
		Self(values.into())
	}

	pub fn values(&self) -> &[f32] {
		&self.0
	}

	/// pgvector text literal, e.g. `[0.1,0.2]`.
	pub fn to_pg(&self) -> String {
		let mut out = String::with_capacity(self.0.len() * 8);

		out.push('[');

		for (i, value) in self.0.iter().enumerate() {
			if i > 0 {
				out.push(',');
			}

			out.push_str(&value.to_string());
		}

		out.push(']');

		out
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
	Equals { column: ScopeColumn, value: String },
	/// Cosine similarity `1 - (embedding_vector <=> vector)` strictly above `threshold`.
	SimilarityAbove { vector: QueryVector, threshold: f64 },
	/// Case-insensitive literal substring match.
	Contains { column: TextColumn, needle: String },
	All(Vec<Condition>),
	Any(Vec<Condition>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Similarity {
	/// Cosine similarity to the query vector, clamped to `[0, 1]`.
	Vector(QueryVector),
	Fixed(f32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
	/// `similarity DESC, id ASC`.
	SimilarityDesc,
	/// `document_id ASC, chunk_index ASC, id ASC`.
	DocumentPosition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
	Count,
	Rows,
}

/// A 1-based page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
	number: u32,
	size: u32,
}
impl Page {
	pub fn new(number: u32, size: u32) -> Result<Self> {
		if number == 0 {
			return Err(Error::InvalidArgument("Page number must be at least 1.".to_string()));
		}
		if size == 0 {
			return Err(Error::InvalidArgument("Page size must be at least 1.".to_string()));
		}

		Ok(Self { number, size })
	}

	pub fn number(&self) -> u32 {
		self.number
	}

	pub fn size(&self) -> u32 {
		self.size
	}

	pub fn limit(&self) -> i64 {
		i64::from(self.size)
	}

	pub fn offset(&self) -> i64 {
		i64::from(self.number - 1) * i64::from(self.size)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkQuery {
	pub predicate: Condition,
	pub similarity: Similarity,
	pub order: Order,
	pub page: Page,
}
impl ChunkQuery {
	pub fn render(&self, projection: Projection) -> QueryBuilder<'static, Postgres> {
		match projection {
			Projection::Count => {
				let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM document_chunks WHERE ");

				push_condition(&mut builder, &self.predicate);

				builder
			},
			Projection::Rows => {
				let mut builder = QueryBuilder::new(SELECT_COLUMNS);

				push_similarity(&mut builder, &self.similarity);
				builder.push(" AS similarity\nFROM document_chunks\nWHERE ");
				push_condition(&mut builder, &self.predicate);
				builder.push("\nORDER BY ");
				builder.push(match self.order {
					Order::SimilarityDesc => "similarity DESC, id ASC",
					Order::DocumentPosition => "document_id ASC, chunk_index ASC, id ASC",
				});
				builder.push("\nLIMIT ");
				builder.push_bind(self.page.limit());
				builder.push(" OFFSET ");
				builder.push_bind(self.page.offset());

				builder
			},
		}
	}
}

/// `ILIKE` pattern matching `needle` literally anywhere in the value.
pub fn like_pattern(needle: &str) -> String {
	let mut out = String::with_capacity(needle.len() + 2);

	out.push('%');

	for ch in needle.chars() {
		if matches!(ch, '\\' | '%' | '_') {
			out.push('\\');
		}

		out.push(ch);
	}

	out.push('%');

	out
}

fn push_similarity(builder: &mut QueryBuilder<'static, Postgres>, similarity: &Similarity) {
	match similarity {
		Similarity::Vector(vector) => {
			builder.push("GREATEST(0, LEAST(1, ");
			push_cosine_similarity(builder, vector);
			builder.push("))::real");
		},
		Similarity::Fixed(value) => {
			builder.push_bind(*value);
			builder.push("::real");
		},
	}
}

/// `1 - cosine distance`, with the NaN a zero-norm stored vector yields read as 0.
fn push_cosine_similarity(builder: &mut QueryBuilder<'static, Postgres>, vector: &QueryVector) {
	builder.push("COALESCE(NULLIF(1 - (embedding_vector <=> ");
	builder.push_bind(vector.to_pg());
	builder.push("::text::vector), 'NaN'::float8), 0)");
}

fn push_condition(builder: &mut QueryBuilder<'static, Postgres>, condition: &Condition) {
	match condition {
		Condition::Equals { column, value } => {
			builder.push(column.as_sql());
			builder.push(" = ");
			builder.push_bind(value.clone());
		},
		Condition::SimilarityAbove { vector, threshold } => {
			push_cosine_similarity(builder, vector);
			builder.push(" > ");
			builder.push_bind(*threshold);
		},
		Condition::Contains { column, needle } => {
			builder.push(column.as_sql());
			builder.push(" ILIKE ");
			builder.push_bind(like_pattern(needle));
		},
		Condition::All(items) => push_group(builder, items, " AND ", "TRUE"),
		Condition::Any(items) => push_group(builder, items, " OR ", "FALSE"),
	}
}

fn push_group(
	builder: &mut QueryBuilder<'static, Postgres>,
	items: &[Condition],
	separator: &str,
	identity: &str,
) {
	if items.is_empty() {
		builder.push(identity);

		return;
	}

	builder.push("(");

	for (i, item) in items.iter().enumerate() {
		if i > 0 {
			builder.push(separator);
		}

		push_condition(builder, item);
	}

	builder.push(")");
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scoped(extra: Vec<Condition>) -> Condition {
		let mut items = vec![
			Condition::Equals { column: ScopeColumn::CollectionId, value: "col-1".to_string() },
			Condition::Equals { column: ScopeColumn::UserId, value: "user-1".to_string() },
		];

		items.extend(extra);

		Condition::All(items)
	}

	fn query(predicate: Condition, similarity: Similarity, order: Order) -> ChunkQuery {
		ChunkQuery {
			predicate,
			similarity,
			order,
			page: Page::new(3, 10).expect("Valid page."),
		}
	}

	#[test]
	fn count_projection_numbers_placeholders_in_walk_order() {
		let vector = QueryVector::new(vec![0.5, 0.25]);
		let predicate = scoped(vec![Condition::Any(vec![
			Condition::SimilarityAbove { vector: vector.clone(), threshold: 0.3 },
			Condition::Contains { column: TextColumn::Content, needle: "pricing".to_string() },
		])]);
		let q = query(predicate, Similarity::Vector(vector), Order::SimilarityDesc);
		let builder = q.render(Projection::Count);

		assert_eq!(
			builder.sql(),
			"SELECT COUNT(*) FROM document_chunks WHERE (collection_id = $1 AND user_id = $2 AND \
			 (COALESCE(NULLIF(1 - (embedding_vector <=> $3::text::vector), 'NaN'::float8), 0) > $4 \
			 OR chunk_content ILIKE $5))"
		);
	}

	#[test]
	fn rows_projection_binds_similarity_before_predicate_and_paging_last() {
		let vector = QueryVector::new(vec![1.0]);
		let predicate = scoped(vec![Condition::SimilarityAbove {
			vector: vector.clone(),
			threshold: 0.3,
		}]);
		let q = query(predicate, Similarity::Vector(vector), Order::SimilarityDesc);
		let builder = q.render(Projection::Rows);
		let sql = builder.sql();

		assert!(sql.contains(
			"GREATEST(0, LEAST(1, COALESCE(NULLIF(1 - (embedding_vector <=> $1::text::vector), \
			 'NaN'::float8), 0)))::real AS similarity"
		));
		assert!(sql.contains(
			"WHERE (collection_id = $2 AND user_id = $3 AND COALESCE(NULLIF(1 - (embedding_vector \
			 <=> $4::text::vector), 'NaN'::float8), 0) > $5)"
		));
		assert!(sql.contains("ORDER BY similarity DESC, id ASC"));
		assert!(sql.ends_with("LIMIT $6 OFFSET $7"));
	}

	#[test]
	fn fixed_similarity_and_document_order() {
		let predicate = scoped(vec![Condition::Any(vec![
			Condition::Contains { column: TextColumn::Content, needle: "alpha".to_string() },
			Condition::Contains { column: TextColumn::Filename, needle: "alpha".to_string() },
		])]);
		let q = query(predicate, Similarity::Fixed(0.7), Order::DocumentPosition);
		let builder = q.render(Projection::Rows);
		let sql = builder.sql();

		assert!(sql.contains("$1::real AS similarity"));
		assert!(sql.contains("(chunk_content ILIKE $4 OR filename ILIKE $5)"));
		assert!(sql.contains("ORDER BY document_id ASC, chunk_index ASC, id ASC"));
		assert!(!sql.contains("embedding_vector"));
	}

	#[test]
	fn empty_groups_render_their_identity() {
		let q = query(Condition::Any(Vec::new()), Similarity::Fixed(0.7), Order::DocumentPosition);

		assert_eq!(q.render(Projection::Count).sql(), "SELECT COUNT(*) FROM document_chunks WHERE FALSE");

		let q = query(Condition::All(Vec::new()), Similarity::Fixed(0.7), Order::DocumentPosition);

		assert_eq!(q.render(Projection::Count).sql(), "SELECT COUNT(*) FROM document_chunks WHERE TRUE");
	}

	#[test]
	fn keyword_array_columns_match_their_text_form() {
		let predicate = scoped(vec![Condition::Any(vec![
			Condition::Contains { column: TextColumn::ChunkKeywords, needle: "refund".to_string() },
			Condition::Contains {
				column: TextColumn::DocumentKeywords,
				needle: "refund".to_string(),
			},
		])]);
		let q = query(predicate, Similarity::Fixed(0.7), Order::DocumentPosition);
		let builder = q.render(Projection::Count);

		assert!(builder.sql().ends_with(
			"(COALESCE(chunk_keywords::text, '') ILIKE $3 OR \
			 COALESCE(document_keywords::text, '') ILIKE $4))"
		));
	}

	#[test]
	fn like_pattern_escapes_wildcards() {
		assert_eq!(like_pattern("pricing"), "%pricing%");
		assert_eq!(like_pattern("100%_off\\"), "%100\\%\\_off\\\\%");
	}

	#[test]
	fn page_offsets_are_never_negative() {
		assert_eq!(Page::new(1, 10).expect("Valid page.").offset(), 0);
		assert_eq!(Page::new(4, 25).expect("Valid page.").offset(), 75);
		assert_eq!(
			Page::new(u32::MAX, u32::MAX).expect("Valid page.").offset(),
			i64::from(u32::MAX - 1) * i64::from(u32::MAX)
		);
		assert!(Page::new(0, 10).is_err());
		assert!(Page::new(1, 0).is_err());
	}

	#[test]
	fn vector_text_literal() {
		assert_eq!(QueryVector::new(vec![0.5, -1.0, 2.25]).to_pg(), "[0.5,-1,2.25]");
		assert_eq!(QueryVector::new(Vec::new()).to_pg(), "[]");
	}
}
