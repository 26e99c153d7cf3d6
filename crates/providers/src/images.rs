use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::ImageProvider;

const OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
const OPENAI_IMAGE_MODEL: &str = "dall-e-3";
const FAL_IMAGES_URL: &str = "https://api.fal.ai/v1/images/generations";
const FAL_IMAGE_MODEL: &str = "fal-ai/ideogram/v2";

/// Portrait slide size shared by both providers (9:16 shorts format).
const SLIDE_WIDTH: u32 = 1024;
const SLIDE_HEIGHT: u32 = 1792;

/// OpenAI image generation (DALL-E). Takes prompt + size + quality and
/// returns a single image URL.
pub struct OpenAiImages {
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiImages {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        let request = OpenAiImageRequest {
            model: OPENAI_IMAGE_MODEL.to_string(),
            prompt: prompt.to_string(),
            n: 1,
            size: format!("{SLIDE_WIDTH}x{SLIDE_HEIGHT}"),
            quality: "standard".to_string(),
        };

        info!("requesting OpenAI image ({} chars of prompt)", prompt.len());
        let response = self
            .client
            .post(OPENAI_IMAGES_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("OpenAI image request failed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "OpenAI API error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        let result: OpenAiImageResponse = response
            .json()
            .await
            .context("invalid OpenAI image response")?;
        result
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .context("OpenAI response contained no image URL")
    }
}

/// FAL image generation (Ideogram). Takes prompt + orientation + explicit
/// pixel dimensions and returns an array of images; the first is used.
pub struct FalImages {
    api_key: String,
    client: reqwest::Client,
}

impl FalImages {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ImageProvider for FalImages {
    fn name(&self) -> &str {
        "fal"
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        let request = FalImageRequest {
            model_name: FAL_IMAGE_MODEL.to_string(),
            prompt: prompt.to_string(),
            orientation: "portrait".to_string(),
            aspect_ratio: "9:16".to_string(),
            width: SLIDE_WIDTH,
            height: SLIDE_HEIGHT,
        };

        info!("requesting FAL image ({} chars of prompt)", prompt.len());
        let response = self
            .client
            .post(FAL_IMAGES_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("FAL image request failed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "FAL API error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        let result: FalImageResponse = response
            .json()
            .await
            .context("invalid FAL image response")?;
        result
            .images
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .context("FAL response contained no image URL")
    }
}

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    quality: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Serialize)]
struct FalImageRequest {
    model_name: String,
    prompt: String,
    orientation: String,
    aspect_ratio: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct FalImageResponse {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}
