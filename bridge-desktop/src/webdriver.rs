//! Page Driver Implementation over the W3C WebDriver protocol
//!
//! Talks JSON over HTTP to a local `chromedriver`/`geckodriver` using
//! `reqwest`. Only the handful of commands the upload core needs are
//! implemented.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    browser::{ElementHandle, PageDriver},
    error::{BridgeError, Result},
};
use bytes::Bytes;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key under which WebDriver serializes element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Options used when creating a new browser session
#[derive(Debug, Clone)]
pub struct WebDriverOptions {
    /// Run the browser without a visible window
    pub headless: bool,
    /// Page load timeout applied by the driver
    pub page_load_timeout: Duration,
    /// HTTP timeout for a single driver command
    pub command_timeout: Duration,
    pub window_width: u32,
    pub window_height: u32,
    /// Persistent browser profile; logins stored there survive restarts
    pub user_data_dir: Option<PathBuf>,
}

impl Default for WebDriverOptions {
    fn default() -> Self {
        Self {
            headless: false,
            page_load_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            window_width: 1920,
            window_height: 1080,
            user_data_dir: None,
        }
    }
}

/// WebDriver-backed [`PageDriver`]
///
/// One instance owns one WebDriver session (one browser window).
pub struct WebDriverPage {
    client: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverPage {
    /// Create a new browser session on the driver at `base_url`
    pub async fn start(base_url: impl Into<String>, options: WebDriverOptions) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Self::build_client(options.command_timeout)?;
        let body = capabilities(&options);

        let response = client
            .post(format!("{}/session", base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::NotAvailable(format!("WebDriver at {}: {}", base_url, e)))?;
        let value = Self::decode(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BridgeError::OperationFailed("WebDriver did not return a session id".to_string())
            })?
            .to_string();

        info!(session_id = %session_id, headless = options.headless, "Started WebDriver session");

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    /// Attach to an already running WebDriver session
    pub fn attach(base_url: impl Into<String>, session_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Self::build_client(WebDriverOptions::default().command_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id: session_id.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// End the WebDriver session and close the browser window
    pub async fn quit(&self) -> Result<()> {
        self.command(Method::DELETE, "", None).await?;
        info!(session_id = %self.session_id, "Closed WebDriver session");
        Ok(())
    }

    /// Cookies visible to the current document
    pub async fn cookies(&self) -> Result<Vec<Value>> {
        let value = self.command(Method::GET, "/cookie", None).await?;
        match value {
            Value::Array(cookies) => Ok(cookies),
            other => Err(BridgeError::OperationFailed(format!(
                "Expected a cookie list from WebDriver, got {}",
                other
            ))),
        }
    }

    /// Add one cookie to the current document's domain
    pub async fn add_cookie(&self, cookie: Value) -> Result<()> {
        self.command(Method::POST, "/cookie", Some(json!({ "cookie": cookie })))
            .await?;
        Ok(())
    }

    fn build_client(timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        debug!(method = %method, path = %path, "WebDriver command");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout(format!("WebDriver command {}: {}", path, e))
            } else {
                BridgeError::OperationFailed(format!("WebDriver command {}: {}", path, e))
            }
        })?;

        Self::decode(response).await
    }

    /// Unwrap the `value` envelope and map protocol errors
    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid WebDriver response: {}", e)))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Err(map_protocol_error(&error, &message))
    }

    fn element_path(element: &ElementHandle, suffix: &str) -> String {
        format!("/element/{}{}", element.as_str(), suffix)
    }

    fn parse_elements(value: Value) -> Result<Vec<ElementHandle>> {
        let items = value.as_array().ok_or_else(|| {
            BridgeError::OperationFailed("Expected an element list from WebDriver".to_string())
        })?;

        Ok(items
            .iter()
            .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(ElementHandle::new)
            .collect())
    }
}

/// New-session request body for `options`
fn capabilities(options: &WebDriverOptions) -> Value {
    let mut args = vec![format!(
        "--window-size={},{}",
        options.window_width, options.window_height
    )];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(dir) = &options.user_data_dir {
        args.push(format!("--user-data-dir={}", dir.display()));
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "strictFileInteractability": false,
                "timeouts": {
                    "pageLoad": options.page_load_timeout.as_millis() as u64,
                },
                "goog:chromeOptions": { "args": args },
            }
        }
    })
}

fn decode_screenshot(value: &Value) -> Result<Bytes> {
    let encoded = value.as_str().ok_or_else(|| {
        BridgeError::OperationFailed("Expected base64 screenshot data".to_string())
    })?;
    STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|e| BridgeError::OperationFailed(format!("Invalid screenshot data: {}", e)))
}

fn map_protocol_error(error: &str, message: &str) -> BridgeError {
    match error {
        "invalid session id" | "no such window" | "session not created" => {
            BridgeError::SessionExpired(format!("{}: {}", error, message))
        }
        "timeout" | "script timeout" => BridgeError::Timeout(format!("{}: {}", error, message)),
        _ => BridgeError::OperationFailed(format!("{}: {}", error, message)),
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Self::parse_elements(value)
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let value = self
            .command(
                Method::POST,
                &Self::element_path(parent, "/elements"),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Self::parse_elements(value)
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &Self::element_path(element, &format!("/attribute/{}", name)),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/displayed"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.command(
            Method::POST,
            &Self::element_path(element, "/click"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn set_input_files(&self, element: &ElementHandle, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            warn!("set_input_files called without any paths");
            return Ok(());
        }

        // Multiple files are sent as one newline-separated value
        let text = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        self.command(
            Method::POST,
            &Self::element_path(element, "/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        debug!(count = paths.len(), "Attached files to input");
        Ok(())
    }

    async fn screenshot(&self) -> Result<Bytes> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        decode_screenshot(&value)
    }
}
