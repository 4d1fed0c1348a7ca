//! HTTP-backed rendering session
//!
//! This module implements the `Session` capability over plain HTTP:
//! - navigation is a GET request
//! - clicking follows the element's `href`
//! - waiting for a selector polls the current URL until it matches
//! - status codes and transport errors are classified into retryable and
//!   structural failures

use crate::config::UserAgentConfig;
use crate::render::{Element, Session};
use crate::state::Throttle;
use crate::SessionError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout (the page load timeout)
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// A rendering session that fetches pages over HTTP
pub struct HttpSession {
    client: Client,

    /// Period between re-fetches while waiting for a selector
    poll_interval: Duration,

    /// Politeness floor applied to every request, re-fetches included
    throttle: Throttle,

    current_url: Option<Url>,

    /// Markup of the current page
    document: Option<String>,
}

impl HttpSession {
    /// Creates a session
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `poll_interval` - Period between re-fetches while waiting
    /// * `politeness_delay` - Minimum interval between any two requests of
    ///   this session
    pub fn new(client: Client, poll_interval: Duration, politeness_delay: Duration) -> Self {
        Self {
            client,
            poll_interval,
            throttle: Throttle::new(politeness_delay),
            current_url: None,
            document: None,
        }
    }

    /// Number of requests sent so far
    pub fn request_count(&self) -> u64 {
        self.throttle.request_count
    }

    fn document(&self) -> Result<&str, SessionError> {
        self.document
            .as_deref()
            .ok_or_else(|| SessionError::structural("no page has been loaded"))
    }

    /// Fetches `url` and returns its body, classifying failures
    async fn fetch(&self, url: &Url) -> Result<String, SessionError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        if let Some(error) = classify_status(url, response.status()) {
            return Err(error);
        }

        response.text().await.map_err(|e| classify_error(url, e))
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn navigate(&mut self, url: &Url) -> Result<(), SessionError> {
        self.throttle.wait().await;
        let body = self.fetch(url).await?;
        self.current_url = Some(url.clone());
        self.document = Some(body);
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;

        loop {
            if select_first(self.document()?, selector)?.is_some() {
                return Ok(());
            }

            // Re-fetch no sooner than both the poll interval and the floor
            let now = Instant::now();
            let pause = self
                .throttle
                .time_until_next_request(now)
                .map_or(self.poll_interval, |floor| floor.max(self.poll_interval));
            if now + pause > deadline {
                return Err(SessionError::timeout(format!(
                    "'{}' did not appear within {:?}",
                    selector, timeout
                )));
            }

            tokio::time::sleep(pause).await;

            // A static page only changes when fetched again
            if let Some(url) = self.current_url.clone() {
                self.throttle.wait().await;
                match self.fetch(&url).await {
                    Ok(body) => self.document = Some(body),
                    Err(e) if e.kind.is_retryable() => {
                        tracing::debug!("Re-fetch of {} failed while waiting: {}", url, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.document().map(str::to_string)
    }

    async fn current_url(&mut self) -> Result<Option<Url>, SessionError> {
        Ok(self.current_url.clone())
    }

    async fn find_element(&mut self, selector: &str) -> Result<Option<Element>, SessionError> {
        select_first(self.document()?, selector)
    }

    async fn click(&mut self, element: &Element) -> Result<(), SessionError> {
        // The element must still be on the live page
        let live = select_first(self.document()?, &element.selector)?.ok_or_else(|| {
            SessionError::new(
                crate::RenderErrorKind::StaleReference,
                format!("'{}' is no longer on the page", element.selector),
            )
        })?;

        let href = live
            .attr("href")
            .or_else(|| live.attr("data-href"))
            .map(str::trim)
            .filter(|href| !href.is_empty() && *href != "#" && !href.starts_with("javascript:"))
            .ok_or_else(|| {
                SessionError::structural(format!(
                    "'{}' has no navigable href",
                    element.selector
                ))
            })?;

        let base = self
            .current_url
            .clone()
            .ok_or_else(|| SessionError::structural("no page has been loaded"))?;
        let target = base
            .join(href)
            .map_err(|e| SessionError::structural(format!("invalid href '{}': {}", href, e)))?;

        self.navigate(&target).await
    }

    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let live = select_first(self.document()?, &element.selector)?.ok_or_else(|| {
            SessionError::new(
                crate::RenderErrorKind::StaleReference,
                format!("'{}' is no longer on the page", element.selector),
            )
        })?;
        Ok(live.attr(name).map(str::to_string))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.current_url = None;
        self.document = None;
        Ok(())
    }
}

/// Finds the first element matching `selector` in `markup`
fn select_first(markup: &str, selector: &str) -> Result<Option<Element>, SessionError> {
    let parsed = Selector::parse(selector)
        .map_err(|e| SessionError::structural(format!("invalid selector '{}': {:?}", selector, e)))?;
    let document = Html::parse_document(markup);

    let element = document.select(&parsed).next().map(|el| Element {
        selector: selector.to_string(),
        tag: el.value().name().to_string(),
        attributes: el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        text: el.text().collect::<String>().trim().to_string(),
    });

    Ok(element)
}

/// Maps an HTTP status to a session failure, if it is one
///
/// | Status | Kind |
/// |--------|------|
/// | 2xx | success |
/// | 408, 429, 5xx | TransientNetwork |
/// | other | StructuralMismatch |
fn classify_status(url: &Url, status: StatusCode) -> Option<SessionError> {
    if status.is_success() {
        return None;
    }

    let message = format!("HTTP {} for {}", status.as_u16(), url);

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Some(SessionError::network(message))
    } else {
        Some(SessionError::structural(message))
    }
}

/// Classifies a transport error
fn classify_error(url: &Url, error: reqwest::Error) -> SessionError {
    if error.is_timeout() {
        SessionError::timeout(format!("request to {} timed out", url))
    } else if error.is_decode() {
        SessionError::structural(format!("undecodable body from {}: {}", url, error))
    } else {
        SessionError::network(format!("request to {} failed: {}", url, error))
    }
}
