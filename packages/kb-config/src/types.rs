use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	/// May be left blank in the file and supplied through `KB_PG_DSN`.
	#[serde(default)]
	pub dsn: String,
	pub pool_max_conns: u32,
	#[serde(default = "default_acquire_timeout_ms")]
	pub acquire_timeout_ms: u64,
	/// Upper bound for a single count or select statement.
	#[serde(default = "default_query_timeout_ms")]
	pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	/// May be left blank in the file and supplied through `KB_EMBEDDING_API_KEY`.
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	/// Chunks whose cosine similarity to the query exceeds this value match without a keyword
	/// hit. Lower values favor recall over precision.
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f64,
	/// Placeholder score attached to every keyword-only fallback result.
	#[serde(default = "default_fallback_similarity")]
	pub fallback_similarity: f32,
	/// Run a count query on the fallback path instead of reporting the page length as the total.
	#[serde(default)]
	pub fallback_count: bool,
	#[serde(default = "default_page_size")]
	pub default_page_size: u32,
	#[serde(default = "default_max_page_size")]
	pub max_page_size: u32,
	#[serde(default = "default_max_keywords")]
	pub max_keywords: u32,
	#[serde(default = "default_keyword_columns")]
	pub keyword_columns: Vec<KeywordColumn>,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			similarity_threshold: default_similarity_threshold(),
			fallback_similarity: default_fallback_similarity(),
			fallback_count: false,
			default_page_size: default_page_size(),
			max_page_size: default_max_page_size(),
			max_keywords: default_max_keywords(),
			keyword_columns: default_keyword_columns(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordColumn {
	Content,
	DocumentTitle,
	Filename,
	ChunkKeywords,
	DocumentKeywords,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Security {
	pub api_auth_token: Option<String>,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_acquire_timeout_ms() -> u64 {
	5_000
}

fn default_query_timeout_ms() -> u64 {
	10_000
}

fn default_similarity_threshold() -> f64 {
	0.3
}

fn default_fallback_similarity() -> f32 {
	0.7
}

fn default_page_size() -> u32 {
	10
}

fn default_max_page_size() -> u32 {
	100
}

fn default_max_keywords() -> u32 {
	16
}

fn default_keyword_columns() -> Vec<KeywordColumn> {
	vec![KeywordColumn::Content]
}
