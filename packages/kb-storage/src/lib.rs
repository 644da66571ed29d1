pub mod db;
pub mod models;
pub mod postgres;
pub mod query;
pub mod schema;

mod error;

pub use error::Error;

use std::{future::Future, pin::Pin};

use crate::{models::ChunkRow, query::ChunkQuery};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of per-search sessions over the chunk table.
pub trait ChunkStore
where
	Self: Send + Sync,
{
	/// Acquires a session. The session owns its connection until it is closed or dropped.
	fn open(&self) -> BoxFuture<'_, Result<Box<dyn ChunkSession>>>;
}

/// One search invocation's view of the store.
///
/// Dropping a session releases its connection; [`ChunkSession::close`] does the same but
/// reports failures.
pub trait ChunkSession
where
	Self: Send,
{
	fn count<'a>(&'a mut self, query: &'a ChunkQuery) -> BoxFuture<'a, Result<u64>>;

	fn fetch<'a>(&'a mut self, query: &'a ChunkQuery) -> BoxFuture<'a, Result<Vec<ChunkRow>>>;

	fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}
