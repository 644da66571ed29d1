pub mod search;

mod error;

pub use error::{Error, Result};
pub use kb_storage::BoxFuture;
pub use search::{SearchRequest, SearchResponse, SearchResult};

use std::sync::Arc;

use kb_config::Config;
use kb_providers::embedding::EmbeddingClient;
use kb_storage::ChunkStore;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;
}

impl EmbeddingProvider for EmbeddingClient {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { EmbeddingClient::embed(self, text).await.map_err(Error::from) })
	}
}

/// Resolves the user on whose behalf a search runs.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	fn current_user_id(&self) -> Option<String>;
}

/// Identity fixed at construction, as resolved by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
	user_id: Option<String>,
}
impl StaticIdentity {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self { user_id: Some(user_id.into()) }
	}

	pub fn anonymous() -> Self {
		Self { user_id: None }
	}
}
impl IdentityProvider for StaticIdentity {
	fn current_user_id(&self) -> Option<String> {
		self.user_id.clone()
	}
}

pub struct KbService {
	pub cfg: Config,
	pub store: Arc<dyn ChunkStore>,
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl KbService {
	pub fn new(
		cfg: Config,
		store: Arc<dyn ChunkStore>,
		embedding: Arc<dyn EmbeddingProvider>,
	) -> Self {
		Self { cfg, store, embedding }
	}
}
