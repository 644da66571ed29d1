use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use kb_storage::{
	BoxFuture, ChunkSession, ChunkStore, Error, Result,
	models::ChunkRow,
	query::{ChunkQuery, Condition, Order, ScopeColumn, Similarity, TextColumn},
};

use crate::StoredChunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureMode {
	None,
	/// Statements that touch `embedding_vector` fail, as on a database without pgvector.
	RejectVector,
	/// Statements that touch `embedding_vector` time out and leave the session unusable, as a
	/// connection still draining an abandoned statement.
	TimeoutVector,
	RejectAll,
}

#[derive(Debug, Default)]
pub struct StoreStats {
	opened: AtomicUsize,
	released: AtomicUsize,
	counts: AtomicUsize,
	fetches: AtomicUsize,
}
impl StoreStats {
	pub fn opened(&self) -> usize {
		self.opened.load(Ordering::SeqCst)
	}

	pub fn released(&self) -> usize {
		self.released.load(Ordering::SeqCst)
	}

	pub fn counts(&self) -> usize {
		self.counts.load(Ordering::SeqCst)
	}

	pub fn fetches(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	pub fn statements(&self) -> usize {
		self.counts() + self.fetches()
	}
}

/// [`ChunkStore`] over a fixed set of chunks that evaluates query descriptors in memory.
#[derive(Clone)]
pub struct MemoryChunkStore {
	chunks: Arc<Vec<StoredChunk>>,
	failure: FailureMode,
	fail_close: bool,
	stats: Arc<StoreStats>,
}
impl MemoryChunkStore {
	pub fn new(chunks: Vec<StoredChunk>) -> Self {
		Self {
			chunks: Arc::new(chunks),
			failure: FailureMode::None,
			fail_close: false,
			stats: Arc::new(StoreStats::default()),
		}
	}

	pub fn with_failure(mut self, failure: FailureMode) -> Self {
		self.failure = failure;

		self
	}

	pub fn with_failing_close(mut self) -> Self {
		self.fail_close = true;

		self
	}

	pub fn stats(&self) -> Arc<StoreStats> {
		self.stats.clone()
	}
}
impl ChunkStore for MemoryChunkStore {
	fn open(&self) -> BoxFuture<'_, Result<Box<dyn ChunkSession>>> {
		self.stats.opened.fetch_add(1, Ordering::SeqCst);

		let session: Box<dyn ChunkSession> = Box::new(MemorySession {
			chunks: self.chunks.clone(),
			failure: self.failure,
			fail_close: self.fail_close,
			stalled: false,
			stats: self.stats.clone(),
		});

		Box::pin(async move { Ok(session) })
	}
}

struct MemorySession {
	chunks: Arc<Vec<StoredChunk>>,
	failure: FailureMode,
	fail_close: bool,
	stalled: bool,
	stats: Arc<StoreStats>,
}
impl MemorySession {
	fn check(&mut self, query: &ChunkQuery) -> Result<()> {
		if self.stalled {
			return Err(Error::Timeout { operation: "Chunk select query", timeout_ms: 0 });
		}

		match self.failure {
			FailureMode::None => Ok(()),
			FailureMode::RejectVector if uses_vector(query) => Err(Error::Sqlx(
				sqlx::Error::Protocol("operator does not exist: vector <=> vector".to_string()),
			)),
			FailureMode::RejectVector => Ok(()),
			FailureMode::TimeoutVector if uses_vector(query) => {
				self.stalled = true;

				Err(Error::Timeout { operation: "Chunk count query", timeout_ms: 0 })
			},
			FailureMode::TimeoutVector => Ok(()),
			FailureMode::RejectAll =>
				Err(Error::Sqlx(sqlx::Error::Protocol("connection reset by peer".to_string()))),
		}
	}

	fn matching(&self, query: &ChunkQuery) -> Result<Vec<&StoredChunk>> {
		let mut out = Vec::new();

		for chunk in self.chunks.iter() {
			if evaluate(&query.predicate, chunk)? {
				out.push(chunk);
			}
		}

		Ok(out)
	}
}
impl ChunkSession for MemorySession {
	fn count<'a>(&'a mut self, query: &'a ChunkQuery) -> BoxFuture<'a, Result<u64>> {
		self.stats.counts.fetch_add(1, Ordering::SeqCst);

		let result =
			self.check(query).and_then(|()| self.matching(query)).map(|rows| rows.len() as u64);

		Box::pin(async move { result })
	}

	fn fetch<'a>(&'a mut self, query: &'a ChunkQuery) -> BoxFuture<'a, Result<Vec<ChunkRow>>> {
		self.stats.fetches.fetch_add(1, Ordering::SeqCst);

		let result = self.check(query).and_then(|()| select(self.matching(query)?, query));

		Box::pin(async move { result })
	}

	fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		let fail = self.fail_close;

		drop(self);

		Box::pin(async move {
			if fail {
				return Err(Error::Sqlx(sqlx::Error::PoolClosed));
			}

			Ok(())
		})
	}
}
impl Drop for MemorySession {
	fn drop(&mut self) {
		self.stats.released.fetch_add(1, Ordering::SeqCst);
	}
}

fn select(rows: Vec<&StoredChunk>, query: &ChunkQuery) -> Result<Vec<ChunkRow>> {
	let mut scored = Vec::with_capacity(rows.len());

	for chunk in rows {
		let similarity = match &query.similarity {
			Similarity::Vector(vector) =>
				cosine_similarity(vector.values(), &chunk.embedding)?.clamp(0.0, 1.0),
			Similarity::Fixed(value) => *value,
		};

		scored.push(to_row(chunk, similarity));
	}

	match query.order {
		Order::SimilarityDesc => scored.sort_by(|a, b| {
			b.similarity.total_cmp(&a.similarity).then_with(|| a.id.cmp(&b.id))
		}),
		Order::DocumentPosition => scored.sort_by(|a, b| {
			a.document_id
				.cmp(&b.document_id)
				.then_with(|| a.chunk_index.cmp(&b.chunk_index))
				.then_with(|| a.id.cmp(&b.id))
		}),
	}

	let offset = query.page.offset() as usize;
	let limit = query.page.limit() as usize;

	Ok(scored.into_iter().skip(offset).take(limit).collect())
}

fn evaluate(condition: &Condition, chunk: &StoredChunk) -> Result<bool> {
	match condition {
		Condition::Equals { column, value } => Ok(match column {
			ScopeColumn::CollectionId => chunk.collection_id == *value,
			ScopeColumn::UserId => chunk.user_id == *value,
		}),
		Condition::SimilarityAbove { vector, threshold } =>
			Ok(f64::from(cosine_similarity(vector.values(), &chunk.embedding)?) > *threshold),
		Condition::Contains { column, needle } => {
			let haystack = match column {
				TextColumn::Content => chunk.content.clone(),
				TextColumn::DocumentTitle => chunk.document_title.clone().unwrap_or_default(),
				TextColumn::Filename => chunk.filename.clone().unwrap_or_default(),
				TextColumn::ChunkKeywords => json_text(chunk.chunk_keywords.as_deref()),
				TextColumn::DocumentKeywords => json_text(chunk.document_keywords.as_deref()),
			};

			Ok(haystack.to_lowercase().contains(&needle.to_lowercase()))
		},
		Condition::All(items) => {
			for item in items {
				if !evaluate(item, chunk)? {
					return Ok(false);
				}
			}

			Ok(true)
		},
		Condition::Any(items) => {
			for item in items {
				if evaluate(item, chunk)? {
					return Ok(true);
				}
			}

			Ok(false)
		},
	}
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
	if a.len() != b.len() {
		return Err(Error::Sqlx(sqlx::Error::Protocol(format!(
			"different vector dimensions {} and {}",
			a.len(),
			b.len()
		))));
	}

	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 {
		return Ok(0.0);
	}

	Ok(dot / (norm_a * norm_b))
}

/// `COALESCE(column::text, '')` for a JSON array of strings.
fn json_text(values: Option<&[String]>) -> String {
	values.map(|values| serde_json::Value::from(values.to_vec()).to_string()).unwrap_or_default()
}

fn uses_vector(query: &ChunkQuery) -> bool {
	fn walk(condition: &Condition) -> bool {
		match condition {
			Condition::SimilarityAbove { .. } => true,
			Condition::All(items) | Condition::Any(items) => items.iter().any(walk),
			Condition::Equals { .. } | Condition::Contains { .. } => false,
		}
	}

	matches!(query.similarity, Similarity::Vector(_)) || walk(&query.predicate)
}

fn to_row(chunk: &StoredChunk, similarity: f32) -> ChunkRow {
	ChunkRow {
		id: chunk.id,
		document_id: chunk.document_id.clone(),
		user_id: chunk.user_id.clone(),
		product_id: chunk.product_id.clone(),
		collection_id: chunk.collection_id.clone(),
		chunk_index: chunk.chunk_index,
		total_chunks: chunk.total_chunks,
		content: chunk.content.clone(),
		filename: chunk.filename.clone(),
		file_url: chunk.file_url.clone(),
		document_title: chunk.document_title.clone(),
		collection_name: chunk.collection_name.clone(),
		similarity,
	}
}
