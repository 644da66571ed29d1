use std::time::Duration;

use sqlx::{PgPool, Postgres, pool::PoolConnection};
use tokio::time;

use crate::{
	BoxFuture, ChunkSession, ChunkStore, Error, Result,
	db::Db,
	models::ChunkRow,
	query::{ChunkQuery, Projection},
};

/// [`ChunkStore`] backed by the Postgres pool. Each session holds one pooled connection.
#[derive(Clone)]
pub struct PgChunkStore {
	pool: PgPool,
	query_timeout: Duration,
}
impl PgChunkStore {
	pub fn new(db: &Db, cfg: &kb_config::Postgres) -> Self {
		Self { pool: db.pool.clone(), query_timeout: Duration::from_millis(cfg.query_timeout_ms) }
	}
}
impl ChunkStore for PgChunkStore {
	fn open(&self) -> BoxFuture<'_, Result<Box<dyn ChunkSession>>> {
		Box::pin(async move {
			let conn = self.pool.acquire().await?;
			let session: Box<dyn ChunkSession> =
				Box::new(PgSession { conn, query_timeout: self.query_timeout, failed: false });

			Ok(session)
		})
	}
}

pub struct PgSession {
	conn: PoolConnection<Postgres>,
	query_timeout: Duration,
	failed: bool,
}
impl PgSession {
	fn settle<T>(
		&mut self,
		operation: &'static str,
		outcome: std::result::Result<std::result::Result<T, sqlx::Error>, time::error::Elapsed>,
	) -> Result<T> {
		match outcome {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => {
				self.failed = true;

				Err(err.into())
			},
			Err(_) => {
				self.failed = true;

				Err(Error::Timeout { operation, timeout_ms: self.query_timeout.as_millis() as u64 })
			},
		}
	}
}
impl ChunkSession for PgSession {
	fn count<'a>(&'a mut self, query: &'a ChunkQuery) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut builder = query.render(Projection::Count);

			tracing::debug!(sql = builder.sql(), "Chunk count query.");

			let outcome = time::timeout(
				self.query_timeout,
				builder.build_query_scalar::<i64>().fetch_one(&mut *self.conn),
			)
			.await;
			let total = self.settle("Chunk count query", outcome)?;

			Ok(total.max(0) as u64)
		})
	}

	fn fetch<'a>(&'a mut self, query: &'a ChunkQuery) -> BoxFuture<'a, Result<Vec<ChunkRow>>> {
		Box::pin(async move {
			let mut builder = query.render(Projection::Rows);

			tracing::debug!(sql = builder.sql(), "Chunk select query.");

			let outcome = time::timeout(
				self.query_timeout,
				builder.build_query_as::<ChunkRow>().fetch_all(&mut *self.conn),
			)
			.await;

			self.settle("Chunk select query", outcome)
		})
	}

	fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		let PgSession { conn, failed, .. } = *self;

		Box::pin(async move {
			// A connection that failed a statement is not handed back to the pool.
			if failed {
				conn.close().await?;
			}

			Ok(())
		})
	}
}
