use anyhow::Result;
use async_trait::async_trait;

mod chat;
pub use chat::*;
mod images;
pub use images::*;

/// A third-party image-generation API. Implementations make exactly one
/// network request per call and return the URL of the generated image.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, prompt: &str) -> Result<String>;
}
