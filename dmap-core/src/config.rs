/// Client configuration for store-backed executors
///
/// Models carry their own [`TableConfig`](crate::schema::TableConfig); this
/// struct covers the connection the executor opens.
use crate::schema::DEFAULT_REGION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Region to sign requests for
    pub region: String,

    /// Alternative endpoint, e.g. a local store (None = the regional endpoint)
    pub endpoint_url: Option<String>,

    /// Page size to request when a query or scan sets no limit (None = store default)
    pub page_size_hint: Option<usize>,
}

impl Default for ClientConfig {
    /// Reads `AWS_REGION` and `AWS_ENDPOINT_URL` from the environment.
    fn default() -> Self {
        Self {
            region: std::env::var("AWS_REGION")
                .ok()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok().filter(|u| !u.is_empty()),
            page_size_hint: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration from the environment
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_page_size_hint(mut self, size: usize) -> Self {
        self.page_size_hint = Some(size);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.region.trim().is_empty() {
            return Err("region must not be empty".to_string());
        }

        if let Some(url) = &self.endpoint_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("endpoint_url must be an http(s) URL, got '{}'", url));
            }
        }

        if self.page_size_hint == Some(0) {
            return Err("page_size_hint must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}
