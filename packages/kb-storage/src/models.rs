/// A chunk as projected by a select query, with its similarity to the query.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChunkRow {
	pub id: i64,
	pub document_id: String,
	pub user_id: String,
	pub product_id: Option<String>,
	pub collection_id: String,
	pub chunk_index: i32,
	pub total_chunks: i32,
	pub content: String,
	pub filename: Option<String>,
	pub file_url: Option<String>,
	pub document_title: Option<String>,
	pub collection_name: Option<String>,
	pub similarity: f32,
}
