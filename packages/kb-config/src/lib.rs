mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, KeywordColumn, Postgres, Providers, Search, Security,
	Service, Storage,
};

use std::{env, fs, path::Path};

pub const ENV_PG_DSN: &str = "KB_PG_DSN";
pub const ENV_EMBEDDING_API_KEY: &str = "KB_EMBEDDING_API_KEY";

pub fn load(path: &Path) -> Result<Config> {
	load_with_env(path, |key| env::var(key).ok())
}

/// Like [`load`], with the environment lookup injected.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Config>
where
	F: Fn(&str) -> Option<String>,
{
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_env_overrides(&mut cfg, lookup);

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: format!("storage.postgres.dsn must be non-empty (or set {ENV_PG_DSN})."),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.acquire_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.acquire_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.query_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.query_timeout_ms must be greater than zero.".to_string(),
		});
	}

	let embedding = &cfg.providers.embedding;

	if embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: format!(
				"providers.embedding.api_key must be non-empty (or set {ENV_EMBEDDING_API_KEY})."
			),
		});
	}
	if embedding.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_base must be non-empty.".to_string(),
		});
	}
	if embedding.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.model must be non-empty.".to_string(),
		});
	}
	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_search(&cfg.search)
}

fn validate_search(search: &Search) -> Result<()> {
	for (label, value) in [
		("search.similarity_threshold", search.similarity_threshold),
		("search.fallback_similarity", f64::from(search.fallback_similarity)),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if search.max_page_size == 0 {
		return Err(Error::Validation {
			message: "search.max_page_size must be greater than zero.".to_string(),
		});
	}
	if search.default_page_size == 0 || search.default_page_size > search.max_page_size {
		return Err(Error::Validation {
			message: "search.default_page_size must be between 1 and search.max_page_size."
				.to_string(),
		});
	}
	if search.max_keywords == 0 {
		return Err(Error::Validation {
			message: "search.max_keywords must be greater than zero.".to_string(),
		});
	}
	if search.keyword_columns.is_empty() {
		return Err(Error::Validation {
			message: "search.keyword_columns must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
	F: Fn(&str) -> Option<String>,
{
	if let Some(dsn) = lookup(ENV_PG_DSN).filter(|value| !value.trim().is_empty()) {
		cfg.storage.postgres.dsn = dsn;
	}
	if let Some(key) = lookup(ENV_EMBEDDING_API_KEY).filter(|value| !value.trim().is_empty()) {
		cfg.providers.embedding.api_key = key;
	}
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}

	let mut columns = Vec::with_capacity(cfg.search.keyword_columns.len());

	for column in cfg.search.keyword_columns.drain(..) {
		if !columns.contains(&column) {
			columns.push(column);
		}
	}

	cfg.search.keyword_columns = columns;
}
