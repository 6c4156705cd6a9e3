//! Reference worker: replies with the payload in upper case.

use async_trait::async_trait;

use super::{Worker, WorkerError};

#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseWorker;

#[async_trait]
impl Worker for UppercaseWorker {
    async fn handle(&mut self, payload: String) -> Result<String, WorkerError> {
        Ok(payload.to_uppercase())
    }
}
