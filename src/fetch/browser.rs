use super::{PageSession, PageSource};
use crate::{config::MonitorConfig, error::MonitorError};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::{task::JoinHandle, time::Duration};
use tracing::{debug, warn};

fn browser_error(e: impl std::fmt::Display) -> MonitorError {
    MonitorError::BrowserError(e.to_string())
}

/// Headless Chromium. Each site gets its own tab, closed after use.
pub struct BrowserSource {
    browser: Browser,
    handler: JoinHandle<()>,
    user_agent: String,
}

impl BrowserSource {
    pub async fn launch(config: &MonitorConfig) -> Result<BrowserSource, MonitorError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox");
        // Chromium ignores credentials embedded in --proxy-server.
        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        let browser_config = builder.build().map_err(MonitorError::BrowserError)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(browser_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(BrowserSource {
            browser,
            handler,
            user_agent: config.user_agent.clone(),
        })
    }
}

impl Drop for BrowserSource {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Owns one tab. A session dropped without `close`, e.g. by a cancelled
/// deadline, still gets its tab closed in the background.
struct BrowserSession {
    page: Option<Page>,
    user_agent: String,
}

impl BrowserSession {
    fn page(&self) -> Result<&Page, MonitorError> {
        self.page
            .as_ref()
            .ok_or_else(|| MonitorError::BrowserError("page already closed".to_string()))
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = page.close().await {
                        debug!("Failed to close abandoned tab: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime left to close an abandoned tab"),
        }
    }
}

#[async_trait::async_trait]
impl PageSource for BrowserSource {
    async fn open(&self) -> Result<Box<dyn PageSession>, MonitorError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;

        Ok(Box::new(BrowserSession {
            page: Some(page),
            user_agent: self.user_agent.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl PageSession for BrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<(), MonitorError> {
        let page = self.page()?;
        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.as_str()))
            .await
            .map_err(browser_error)?;
        page.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, MonitorError> {
        self.page()?.content().await.map_err(browser_error)
    }

    async fn settle(&mut self, timeout: Duration) -> Result<(), MonitorError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(browser_error(e)),
            Err(_) => debug!("Page did not settle in {:?}", timeout),
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), MonitorError> {
        let mut session = self;
        match session.page.take() {
            Some(page) => page.close().await.map_err(browser_error),
            None => Ok(()),
        }
    }
}
