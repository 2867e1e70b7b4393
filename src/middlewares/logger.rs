use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::{
    event::Event,
    middleware::{Middleware, Verdict},
};

pub struct Logger {}

#[async_trait]
impl Middleware for Logger {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }

    fn on_event(&self, event: &Event) -> Result<Verdict> {
        tracing::info!(service_id=%event.service_id, "{event}");
        Ok(Verdict::Continue)
    }
}
