mod error;
mod memory;

pub use error::{Error, Result};
pub use memory::{FailureMode, MemoryChunkStore, StoreStats};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor, PgPool,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

use kb_storage::query::QueryVector;

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A chunk as the ingestion pipeline would have stored it.
#[derive(Clone, Debug)]
pub struct StoredChunk {
	pub id: i64,
	pub document_id: String,
	pub user_id: String,
	pub product_id: Option<String>,
	pub collection_id: String,
	pub chunk_index: i32,
	pub total_chunks: i32,
	pub content: String,
	pub embedding: Vec<f32>,
	pub filename: Option<String>,
	pub file_url: Option<String>,
	pub document_title: Option<String>,
	pub collection_name: Option<String>,
	pub chunk_keywords: Option<Vec<String>>,
	pub document_keywords: Option<Vec<String>>,
}
impl StoredChunk {
	pub fn new(
		id: i64,
		collection_id: &str,
		user_id: &str,
		document_id: &str,
		chunk_index: i32,
		content: &str,
		embedding: Vec<f32>,
	) -> Self {
		Self {
			id,
			document_id: document_id.to_string(),
			user_id: user_id.to_string(),
			product_id: None,
			collection_id: collection_id.to_string(),
			chunk_index,
			total_chunks: chunk_index + 1,
			content: content.to_string(),
			embedding,
			filename: Some(format!("{document_id}.md")),
			file_url: None,
			document_title: Some(document_id.to_string()),
			collection_name: Some(collection_id.to_string()),
			chunk_keywords: None,
			document_keywords: None,
		}
	}
}

/// Unit vector in the first two dimensions whose cosine similarity to `[1, 0, ...]` is
/// `similarity`.
pub fn vector_with_similarity(similarity: f32, dim: usize) -> Vec<f32> {
	let mut vec = vec![0.0; dim.max(2)];

	vec[0] = similarity;
	vec[1] = (1.0 - similarity * similarity).max(0.0).sqrt();

	vec
}

pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options: PgConnectOptions = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse KB_PG_DSN: {err}.")))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("kb_test_{}", Uuid::new_v4().simple());
		let create_sql = format!(r#"CREATE DATABASE "{}""#, name);

		admin_conn
			.execute(create_sql.as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create test database: {err}.")))?;

		let dsn = base_options.clone().database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, cleaned: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		cleanup_database(&self.name, &self.admin_options).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let admin_options = self.admin_options.clone();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test database cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(cleanup_database(&name, &admin_options)) {
				eprintln!("Test database cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("KB_PG_DSN").ok()
}

pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let db = TestDatabase::new(base_dsn).await?;
	let result = f(&db).await;
	let mut db = db;

	if let Err(err) = db.cleanup_inner().await {
		eprintln!("Test database cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

/// Inserts chunks the way the ingestion pipeline does. Ids are assigned by the database in
/// slice order.
pub async fn seed_chunks(pool: &PgPool, chunks: &[StoredChunk]) -> Result<Vec<i64>> {
	let mut ids = Vec::with_capacity(chunks.len());

	for chunk in chunks {
		let id: i64 = sqlx::query_scalar(
			"\
INSERT INTO document_chunks (
	document_id,
	collection_id,
	user_id,
	product_id,
	chunk_index,
	total_chunks,
	chunk_content,
	embedding_vector,
	filename,
	file_url,
	document_title,
	collection_name,
	chunk_keywords,
	document_keywords
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8::text::vector,$9,$10,$11,$12,$13::text::jsonb,$14::text::jsonb)
RETURNING id",
		)
		.bind(chunk.document_id.as_str())
		.bind(chunk.collection_id.as_str())
		.bind(chunk.user_id.as_str())
		.bind(chunk.product_id.as_deref())
		.bind(chunk.chunk_index)
		.bind(chunk.total_chunks)
		.bind(chunk.content.as_str())
		.bind(QueryVector::new(chunk.embedding.clone()).to_pg())
		.bind(chunk.filename.as_deref())
		.bind(chunk.file_url.as_deref())
		.bind(chunk.document_title.as_deref())
		.bind(chunk.collection_name.as_deref())
		.bind(chunk.chunk_keywords.as_ref().map(|values| serde_json::json!(values).to_string()))
		.bind(chunk.document_keywords.as_ref().map(|values| serde_json::json!(values).to_string()))
		.fetch_one(pool)
		.await?;

		ids.push(id);
	}

	Ok(ids)
}

async fn connect_admin(
	base_options: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => {
				last_err = Some(err);
			},
		}
	}

	Err(Error::Message(format!("Failed to connect to an admin database: {last_err:?}.")))
}

async fn cleanup_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options).await.map_err(|err| {
		Error::Message(format!("Failed to connect to admin database for cleanup: {err}."))
	})?;
	let drop_sql = format!(r#"DROP DATABASE IF EXISTS "{}""#, name);
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	sqlx::query(drop_sql.as_str())
		.execute(&mut conn)
		.await
		.map_err(|err| Error::Message(format!("Failed to drop test database: {err}.")))?;

	Ok(())
}
