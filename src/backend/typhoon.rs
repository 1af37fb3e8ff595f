//! OCR using Typhoon OCR, or any other vision model behind an
//! OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_openai::{
    config::{Config as _, OpenAIConfig},
    types::CreateChatCompletionResponse,
};
use base64::{Engine as _, prelude::BASE64_STANDARD};
use serde_json::json;

use crate::{credentials::ApiKey, prelude::*};

use super::{
    BackendError, PageBackend, TaskType,
    render::{RenderOpts, render_page},
};

/// The default OCR server.
pub const DEFAULT_API_BASE: &str = "https://api.opentyphoon.ai/v1";

/// The default OCR model.
pub const DEFAULT_MODEL: &str = "typhoon-ocr-preview";

/// Instructions for [`TaskType::Default`].
const DEFAULT_INSTRUCTIONS: &str = "\
Below is an image of a document page. Return the markdown representation of \
this document, presenting tables in markdown format as they naturally appear.
If the document contains images, use a placeholder like dummy.png for each image.
Your final output must be in JSON format with a single key `natural_text` \
containing the response.
RESPOND ONLY IN JSON FORMAT.";

/// Instructions for [`TaskType::Structure`].
const STRUCTURE_INSTRUCTIONS: &str = "\
Below is an image of a document page. Return the markdown representation of \
this document, presenting tables in HTML format as they naturally appear.
If the document contains images or figures, analyze them and include the tag \
<figure>IMAGE_ANALYSIS</figure> in the appropriate location.
Your final output must be in JSON format with a single key `natural_text` \
containing the response.
RESPOND ONLY IN JSON FORMAT.";

impl TaskType {
    /// Instructions sent along with the page image.
    fn instructions(self) -> &'static str {
        match self {
            TaskType::Default => DEFAULT_INSTRUCTIONS,
            TaskType::Structure => STRUCTURE_INSTRUCTIONS,
        }
    }
}

/// OCR backend which sends rendered pages to an OpenAI-compatible vision
/// model.
pub struct TyphoonBackend {
    /// Server URL and credentials.
    config: OpenAIConfig,
    /// HTTP client.
    client: reqwest::Client,
    /// Model name.
    model: String,
    /// How to render pages before uploading them.
    render_opts: RenderOpts,
}

impl TyphoonBackend {
    /// Create a new backend.
    pub fn new(
        api_base: &str,
        api_key: ApiKey,
        model: String,
        timeout: Option<Duration>,
        render_opts: RenderOpts,
    ) -> Result<Self> {
        let config = OpenAIConfig::new()
            .with_api_base(api_base.trim_end_matches('/'))
            .with_api_key(api_key.expose());
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to create HTTP client")?;
        Ok(Self {
            config,
            client,
            model,
            render_opts,
        })
    }

    /// Build the request body for one page.
    fn request_body(&self, task_type: TaskType, png: &[u8]) -> Value {
        let page_data_url = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(png));
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": task_type.instructions() },
                    { "type": "image_url", "image_url": { "url": page_data_url } },
                ],
            }],
            "max_tokens": 16384,
            "temperature": 0.1,
            "top_p": 0.6,
            "repetition_penalty": 1.2,
        })
    }
}

#[async_trait]
impl PageBackend for TyphoonBackend {
    #[instrument(level = "debug", skip_all, fields(page = page))]
    async fn ocr_page(
        &self,
        document: &Path,
        task_type: TaskType,
        page: u32,
    ) -> Result<String, BackendError> {
        let rendered = render_page(document, page, &self.render_opts).await?;
        let body = self.request_body(task_type, &rendered.read().await?);
        drop(rendered);

        let response = self
            .client
            .post(self.config.url("/chat/completions"))
            .headers(self.config.headers())
            .json(&body)
            .send()
            .await
            .map_err(|err| match err.status() {
                Some(status) => BackendError::with_status(status, err),
                None => BackendError::new(err),
            })?;

        let status = response.status();
        if !status.is_success() {
            // Keep the server's own words, because that's what we classify.
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::with_status(
                status,
                anyhow!("OCR server returned {}: {}", status, detail.trim()),
            ));
        }

        let response = response
            .json::<CreateChatCompletionResponse>()
            .await
            .context("Error parsing OCR server response")?;
        trace!(?response, "OCR server response");
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in OCR server response"))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}
