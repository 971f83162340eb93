use std::time::Duration;

use reqwest::{
    header::USER_AGENT,
    Client,
    Response,
};
use tracing::debug;

use crate::core::ImportError;

pub fn http_client() -> Result<Client, ImportError> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| ImportError::Custom(format!("HTTP client build failed: {e}")))
}

pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>, ImportError> {
    let resp = client
        .get(url)
        .header(USER_AGENT, "ankiport/0.1 (+reqwest)")
        .send()
        .await
        .map_err(|e| ImportError::Custom(format!("Failed HTTP GET {}: {}", url, e)))?;

    let resp = ensure_success(resp)?;
    let bytes = resp.bytes().await?;
    debug!("Fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

pub fn ensure_success(resp: Response) -> Result<Response, ImportError> {
    if !resp.status().is_success() {
        return Err(ImportError::Custom(format!(
            "HTTP error {} from {}",
            resp.status(),
            resp.url()
        )));
    }
    Ok(resp)
}
