use std::sync::Arc;

use kb_providers::embedding::EmbeddingClient;
use kb_service::KbService;
use kb_storage::{db::Db, postgres::PgChunkStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<KbService>,
}
impl AppState {
	pub async fn new(config: kb_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.providers.embedding.dimensions).await?;

		let store = PgChunkStore::new(&db, &config.storage.postgres);
		let embedding = EmbeddingClient::new(&config.providers.embedding)?;
		let service = KbService::new(config, Arc::new(store), Arc::new(embedding));

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: KbService) -> Self {
		Self { service: Arc::new(service) }
	}
}
