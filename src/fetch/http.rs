use super::{PageSession, PageSource};
use crate::{config::MonitorConfig, error::MonitorError};
use reqwest::{Client, Proxy};
use tokio::time::Duration;
use tracing::debug;

/// Plain retrieval. Settling after a challenge means polling the URL again.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    require_success: bool,
}

impl HttpSource {
    pub fn new(config: &MonitorConfig) -> Result<HttpSource, MonitorError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.fetch_timeout);
        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(HttpSource {
            client: builder.build()?,
            require_success: false,
        })
    }

    /// Treat non-2xx responses as transport failures.
    pub fn require_success(mut self) -> Self {
        self.require_success = true;
        self
    }

    async fn get(&self, url: &str) -> Result<String, MonitorError> {
        let response = self.client.get(url).send().await?;
        let response = if self.require_success {
            response.error_for_status()?
        } else {
            response
        };
        Ok(response.text().await?)
    }
}

struct HttpSession {
    source: HttpSource,
    url: String,
    body: String,
}

#[async_trait::async_trait]
impl PageSource for HttpSource {
    async fn open(&self) -> Result<Box<dyn PageSession>, MonitorError> {
        Ok(Box::new(HttpSession {
            source: self.clone(),
            url: String::new(),
            body: String::new(),
        }))
    }
}

#[async_trait::async_trait]
impl PageSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), MonitorError> {
        self.body = self.source.get(url).await?;
        self.url = url.to_string();
        Ok(())
    }

    async fn content(&mut self) -> Result<String, MonitorError> {
        Ok(self.body.clone())
    }

    async fn settle(&mut self, timeout: Duration) -> Result<(), MonitorError> {
        match tokio::time::timeout(timeout, self.source.get(&self.url)).await {
            Ok(body) => self.body = body?,
            Err(_) => debug!("Re-poll of {} did not finish in {:?}", self.url, timeout),
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), MonitorError> {
        Ok(())
    }
}
