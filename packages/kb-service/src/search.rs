mod assemble;
mod fallback;
mod hybrid;

pub use assemble::total_pages;
pub use fallback::fallback_query;
pub use hybrid::{SearchScope, hybrid_query};

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use tokio::time;

use kb_domain::keywords;
use kb_storage::{
	ChunkSession,
	models::ChunkRow,
	query::{ChunkQuery, Page, QueryVector, TextColumn},
};

use crate::{Error, IdentityProvider, KbService, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	pub query: String,
	pub collection_id: String,
	#[serde(default, deserialize_with = "lenient_integer")]
	pub page: Option<i64>,
	#[serde(default, deserialize_with = "lenient_integer")]
	pub page_size: Option<i64>,
}
impl SearchRequest {
	pub fn new(query: impl Into<String>, collection_id: impl Into<String>) -> Self {
		Self { query: query.into(), collection_id: collection_id.into(), page: None, page_size: None }
	}

	pub fn with_page(mut self, page: i64, page_size: i64) -> Self {
		self.page = Some(page);
		self.page_size = Some(page_size);

		self
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientInteger {
	Int(i64),
	Float(f64),
	Text(String),
}

/// Accepts `2`, `2.0`, and `"2"` alike; fractional or non-numeric values are rejected.
fn lenient_integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(value) = Option::<LenientInteger>::deserialize(deserializer)? else {
		return Ok(None);
	};
	let number = match value {
		LenientInteger::Int(value) => return Ok(Some(value)),
		LenientInteger::Float(value) => value,
		LenientInteger::Text(text) => {
			let text = text.trim();

			if let Ok(value) = text.parse::<i64>() {
				return Ok(Some(value));
			}

			text.parse::<f64>()
				.map_err(|_| D::Error::custom(format!("Expected an integer, got {text:?}.")))?
		},
	};

	if number.is_finite()
		&& number.fract() == 0.0
		&& number >= i64::MIN as f64
		&& number < i64::MAX as f64
	{
		Ok(Some(number as i64))
	} else {
		Err(D::Error::custom(format!("Expected an integer, got {number}.")))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
	pub id: i64,
	pub document_id: String,
	pub user_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub product_id: Option<String>,
	pub collection_id: String,
	pub chunk_index: i32,
	pub total_chunks: i32,
	pub content: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file_url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document_title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collection_name: Option<String>,
	pub similarity: f32,
}
impl From<ChunkRow> for SearchResult {
	fn from(row: ChunkRow) -> Self {
		Self {
			id: row.id,
			document_id: row.document_id,
			user_id: row.user_id,
			product_id: row.product_id,
			collection_id: row.collection_id,
			chunk_index: row.chunk_index,
			total_chunks: row.total_chunks,
			content: row.content,
			filename: row.filename,
			file_url: row.file_url,
			document_title: row.document_title,
			collection_name: row.collection_name,
			similarity: row.similarity,
		}
	}
}

/// Envelope returned by [`KbService::search`]. Failures are reported in-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub results: Option<Vec<SearchResult>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub page: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_pages: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_results: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl SearchResponse {
	pub fn failure(error: impl Into<String>) -> Self {
		Self {
			success: false,
			results: None,
			page: None,
			total_pages: None,
			total_results: None,
			error: Some(error.into()),
		}
	}
}

/// Which query produced a successful response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPath {
	Hybrid,
	Fallback,
}
impl SearchPath {
	fn as_str(self) -> &'static str {
		match self {
			Self::Hybrid => "hybrid",
			Self::Fallback => "fallback",
		}
	}
}

impl KbService {
	/// Hybrid semantic and keyword search over one collection of the caller's chunks.
	///
	/// Never fails: every error is folded into a `success: false` response.
	pub async fn search(
		&self,
		identity: &dyn IdentityProvider,
		req: SearchRequest,
	) -> SearchResponse {
		match self.try_search(identity, &req).await {
			Ok((response, path)) => {
				tracing::info!(
					collection_id = %req.collection_id,
					path = path.as_str(),
					page = response.page,
					total_results = response.total_results,
					"Chunk search completed."
				);

				response
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					collection_id = %req.collection_id,
					"Chunk search failed."
				);

				SearchResponse::failure(err.to_string())
			},
		}
	}

	async fn try_search(
		&self,
		identity: &dyn IdentityProvider,
		req: &SearchRequest,
	) -> Result<(SearchResponse, SearchPath)> {
		kb_config::validate(&self.cfg)
			.map_err(|err| Error::Configuration { message: err.to_string() })?;

		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Search query cannot be empty.".to_string(),
			});
		}

		let collection_id = req.collection_id.trim();

		if collection_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Collection ID cannot be empty.".to_string(),
			});
		}

		let user_id = identity
			.current_user_id()
			.filter(|user_id| !user_id.trim().is_empty())
			.ok_or(Error::Unauthenticated)?;
		let page = self.resolve_page(req.page, req.page_size)?;
		let extraction =
			keywords::extract_detailed(query, self.cfg.search.max_keywords as usize);

		if let Some(failure) = extraction.failure {
			tracing::warn!(?failure, "Keyword tagging failed. Falling back to whitespace split.");
		}

		tracing::debug!(
			query_chars = query.chars().count(),
			keywords = ?extraction.keywords,
			source = ?extraction.source,
			"Extracted search keywords."
		);

		let vector = self.embed_query(query).await?;
		let scope = SearchScope { collection_id: collection_id.to_string(), user_id };
		let columns = self.keyword_columns();
		let hybrid = hybrid_query(
			&scope,
			vector,
			&extraction.keywords,
			&columns,
			self.cfg.search.similarity_threshold,
			page,
		);
		let mut session = self.store.open().await?;
		let outcome = run_counted(session.as_mut(), &hybrid).await;

		release(session).await;

		match outcome {
			Ok((rows, total)) => Ok((assemble::assemble(rows, page, total), SearchPath::Hybrid)),
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Hybrid chunk query failed. Falling back to keyword-only search."
				);

				let fallback = fallback_query(
					&scope,
					&extraction.keywords,
					&columns,
					self.cfg.search.fallback_similarity,
					page,
				);

				// The hybrid connection may still be busy with an abandoned statement.
				let mut session = self.store.open().await?;
				let response = self.run_fallback(session.as_mut(), &fallback, page).await;

				release(session).await;

				Ok((response?, SearchPath::Fallback))
			},
		}
	}

	async fn run_fallback(
		&self,
		session: &mut dyn ChunkSession,
		fallback: &ChunkQuery,
		page: Page,
	) -> kb_storage::Result<SearchResponse> {
		if self.cfg.search.fallback_count {
			let (rows, total) = run_counted(session, fallback).await?;

			return Ok(assemble::assemble(rows, page, total));
		}

		let rows = session.fetch(fallback).await?;

		Ok(assemble::assemble_uncounted(rows, page))
	}

	async fn embed_query(&self, query: &str) -> Result<QueryVector> {
		let cfg = &self.cfg.providers.embedding;
		let vec = time::timeout(Duration::from_millis(cfg.timeout_ms), self.embedding.embed(query))
			.await
			.map_err(|_| Error::Embedding {
				message: format!("Embedding request timed out after {} ms.", cfg.timeout_ms),
			})??;

		kb_providers::embedding::validate_vector(&vec, cfg.dimensions)?;

		Ok(QueryVector::new(vec))
	}

	fn resolve_page(&self, page: Option<i64>, page_size: Option<i64>) -> Result<Page> {
		let max = self.cfg.search.max_page_size;
		let size = page_size.unwrap_or(i64::from(self.cfg.search.default_page_size));

		if size < 1 || size > i64::from(max) {
			return Err(Error::InvalidRequest {
				message: format!("Page size must be between 1 and {max}."),
			});
		}

		// Pages below 1 are read as the first page.
		let number = u32::try_from(page.unwrap_or(1).max(1)).map_err(|_| Error::InvalidRequest {
			message: "Page number is too large.".to_string(),
		})?;

		Ok(Page::new(number, size as u32)?)
	}

	fn keyword_columns(&self) -> Vec<TextColumn> {
		self.cfg.search.keyword_columns.iter().copied().map(TextColumn::from).collect()
	}
}

async fn release(session: Box<dyn ChunkSession>) {
	if let Err(err) = session.close().await {
		tracing::warn!(error = %err, "Failed to release chunk store session.");
	}
}

async fn run_counted(
	session: &mut dyn ChunkSession,
	query: &ChunkQuery,
) -> kb_storage::Result<(Vec<ChunkRow>, u64)> {
	let total = session.count(query).await?;
	let rows = session.fetch(query).await?;

	Ok((rows, total))
}
