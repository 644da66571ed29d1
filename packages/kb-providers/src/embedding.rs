use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::{Error, Result};

/// Long-lived client for an OpenAI-compatible embeddings endpoint.
///
/// The HTTP client, URL and auth headers are resolved once; every call reuses the
/// connection pool.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
	http: Client,
	url: String,
	headers: HeaderMap,
	model: String,
	dimensions: u32,
}
impl EmbeddingClient {
	pub fn new(cfg: &kb_config::EmbeddingProviderConfig) -> Result<Self> {
		if cfg.dimensions == 0 {
			return Err(Error::InvalidConfig {
				message: "Embedding dimensions must be greater than zero.".to_string(),
			});
		}

		let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
		let http = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			http,
			url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path),
			headers,
			model: cfg.model.clone(),
			dimensions: cfg.dimensions,
		})
	}

	pub fn dimensions(&self) -> u32 {
		self.dimensions
	}

	/// Embeds a single text. Errors instead of ever returning a degenerate vector.
	pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let body = serde_json::json!({
			"model": self.model,
			"input": [text],
			"dimensions": self.dimensions,
		});
		let res = self.http.post(&self.url).headers(self.headers.clone()).json(&body).send().await?;
		let json: Value = res.error_for_status()?.json().await?;
		let mut vectors = parse_embedding_response(json)?;

		if vectors.len() != 1 {
			return Err(Error::InvalidResponse {
				message: format!("Embedding response returned {} vectors for 1 input.", vectors.len()),
			});
		}

		let vec = vectors.remove(0);

		validate_vector(&vec, self.dimensions)?;

		Ok(vec)
	}
}

pub fn validate_vector(vec: &[f32], dimensions: u32) -> Result<()> {
	if vec.len() != dimensions as usize {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding vector has {} dimensions; expected {dimensions}.",
				vec.len()
			),
		});
	}
	if vec.iter().any(|value| !value.is_finite()) {
		return Err(Error::InvalidResponse {
			message: "Embedding vector contains a non-finite value.".to_string(),
		});
	}
	if vec.iter().all(|value| *value == 0.0) {
		return Err(Error::InvalidResponse {
			message: "Embedding vector is all zeros.".to_string(),
		});
	}

	Ok(())
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;

	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
