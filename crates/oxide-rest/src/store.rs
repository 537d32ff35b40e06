//! The DataStore capability.

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::request::Request;

/// A hosted-database capability.
///
/// Implementations never return `Err`: every failure, local or remote, is
/// reported inside the returned [`Envelope`].
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Executes a table request.
    async fn execute(&self, request: Request) -> Envelope;

    /// Invokes a stored procedure with named parameters.
    async fn rpc(&self, procedure: &str, params: Value) -> Envelope;
}
