//! Renderer adapter
//!
//! Turns the low-level session capability into the two operations the
//! pagination controller needs: load a partition's first page, and advance
//! to the next page if there is one.

use crate::config::{Config, SelectorConfig};
use crate::partition::Partition;
use crate::render::{Element, PageSnapshot, Session};
use crate::state::Throttle;
use crate::{RenderError, RenderErrorKind, SessionError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use url::Url;

/// Page-level rendering operations over one partition at a time
#[async_trait]
pub trait Renderer: Send {
    /// Navigates to the partition and returns its first page
    async fn load_partition(&mut self, partition: &Partition) -> Result<PageSnapshot, RenderError>;

    /// Advances past `current`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(snapshot))` - The next page
    /// * `Ok(None)` - `current` is the last page
    /// * `Err(RenderError)` - The next page could not be rendered
    async fn advance_page(
        &mut self,
        current: &PageSnapshot,
    ) -> Result<Option<PageSnapshot>, RenderError>;

    /// Releases the underlying session
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// `Renderer` implementation on top of a `Session`
pub struct SessionRenderer<S: Session> {
    session: S,
    base_url: Url,
    selectors: SelectorConfig,
    page_timeout: Duration,
    poll_interval: Duration,
    throttle: Throttle,

    /// Address of the last page handed out, used to return to it
    page_url: Option<Url>,
}

impl<S: Session> SessionRenderer<S> {
    pub fn new(
        session: S,
        base_url: Url,
        selectors: SelectorConfig,
        page_timeout: Duration,
        poll_interval: Duration,
        politeness_delay: Duration,
    ) -> Self {
        Self {
            session,
            base_url,
            selectors,
            page_timeout,
            poll_interval,
            throttle: Throttle::new(politeness_delay),
            page_url: None,
        }
    }

    /// Creates a renderer with the timing and selectors from `config`
    pub fn from_config(session: S, config: &Config) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&config.crawler.base_url)?;
        Ok(Self::new(
            session,
            base_url,
            config.selectors.clone(),
            config.crawler.page_load_timeout(),
            config.crawler.poll_interval(),
            config.crawler.politeness_delay(),
        ))
    }

    /// Number of navigations and clicks issued so far
    pub fn request_count(&self) -> u64 {
        self.throttle.request_count
    }

    /// Checks the structural state of the next-page control
    async fn is_disabled(&mut self, control: &Element) -> Result<bool, SessionError> {
        let class = self.session.attribute(control, "class").await?;
        if let Some(class) = class {
            if class
                .split_whitespace()
                .any(|c| c == self.selectors.disabled_class)
            {
                return Ok(true);
            }
        }

        if self.session.attribute(control, "disabled").await?.is_some() {
            return Ok(true);
        }

        let aria = self.session.attribute(control, "aria-disabled").await?;
        Ok(aria.map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false))
    }

    /// Makes sure the session shows `current` before its controls are read
    ///
    /// A failed advance can leave the session on a half-rendered page whose
    /// missing next control would read as the end of the partition. In that
    /// case the last handed-out page is opened again; if that does not bring
    /// `current` back the advance fails instead of ending the partition.
    async fn ensure_on(&mut self, current: &PageSnapshot) -> Result<(), SessionError> {
        let expected = listing_fingerprint(&current.markup, &self.selectors);
        let markup = self.session.page_source().await?;
        if expected.is_some() && listing_fingerprint(&markup, &self.selectors) == expected {
            return Ok(());
        }

        let url = self.page_url.clone().ok_or_else(|| {
            SessionError::new(
                RenderErrorKind::StaleReference,
                format!("session left page {} and it has no address", current.page_index),
            )
        })?;

        tracing::debug!(
            "Partition {}: reopening page {} at {}",
            current.partition,
            current.page_index,
            url
        );
        self.throttle.wait().await;
        self.session.navigate(&url).await?;
        self.session
            .wait_for_selector(&self.selectors.listing, self.page_timeout)
            .await?;

        let markup = self.session.page_source().await?;
        if listing_fingerprint(&markup, &self.selectors) != expected {
            return Err(SessionError::new(
                RenderErrorKind::StaleReference,
                format!("{} no longer shows page {}", url, current.page_index),
            ));
        }
        Ok(())
    }

    /// Polls until the listing rows differ from `before`, returning the new markup
    async fn wait_for_refresh(&mut self, before: &str) -> Result<String, SessionError> {
        let deadline = Instant::now() + self.page_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.session
                .wait_for_selector(&self.selectors.listing, remaining)
                .await?;

            let markup = self.session.page_source().await?;
            if rows_fingerprint(&markup, &self.selectors.rows) != before {
                return Ok(markup);
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(SessionError::timeout(format!(
                    "listing did not refresh within {:?}",
                    self.page_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl<S: Session> Renderer for SessionRenderer<S> {
    async fn load_partition(&mut self, partition: &Partition) -> Result<PageSnapshot, RenderError> {
        let url = partition.url(&self.base_url).map_err(|e| {
            RenderError::new(
                RenderErrorKind::StructuralMismatch,
                format!("cannot build partition URL: {}", e),
                partition,
                1,
            )
        })?;

        tracing::debug!("Loading partition {} from {}", partition, url);

        self.throttle.wait().await;
        self.session
            .navigate(&url)
            .await
            .map_err(|e| RenderError::from_session(e, partition, 1))?;
        self.session
            .wait_for_selector(&self.selectors.listing, self.page_timeout)
            .await
            .map_err(|e| RenderError::from_session(e, partition, 1))?;
        let markup = self
            .session
            .page_source()
            .await
            .map_err(|e| RenderError::from_session(e, partition, 1))?;
        self.page_url = self
            .session
            .current_url()
            .await
            .map_err(|e| RenderError::from_session(e, partition, 1))?;

        Ok(PageSnapshot::new(partition.clone(), 1, markup))
    }

    async fn advance_page(
        &mut self,
        current: &PageSnapshot,
    ) -> Result<Option<PageSnapshot>, RenderError> {
        let partition = &current.partition;
        let next_index = current.page_index + 1;
        let to_error = |e: SessionError| RenderError::from_session(e, partition, next_index);

        self.ensure_on(current).await.map_err(to_error)?;

        let next_button = self.selectors.next_button.clone();
        let control = match self.session.find_element(&next_button).await.map_err(to_error)? {
            Some(control) => control,
            None => {
                tracing::debug!("Partition {}: no next control after page {}", partition, current.page_index);
                return Ok(None);
            }
        };

        if self.is_disabled(&control).await.map_err(to_error)? {
            tracing::debug!("Partition {}: next control disabled on page {}", partition, current.page_index);
            return Ok(None);
        }

        let before = rows_fingerprint(&current.markup, &self.selectors.rows);

        self.throttle.wait().await;
        self.session.click(&control).await.map_err(to_error)?;
        let markup = self.wait_for_refresh(&before).await.map_err(to_error)?;
        self.page_url = self.session.current_url().await.map_err(to_error)?;

        Ok(Some(PageSnapshot::new(partition.clone(), next_index, markup)))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.session.close().await
    }
}

/// Rows fingerprint of a page, or None when its listing is absent
fn listing_fingerprint(markup: &str, selectors: &SelectorConfig) -> Option<String> {
    let listing = Selector::parse(&selectors.listing).ok()?;
    let document = Html::parse_document(markup);
    document.select(&listing).next()?;
    Some(rows_fingerprint(markup, &selectors.rows))
}

/// Concatenated markup of the listing rows
///
/// Two renders of the same page yield the same fingerprint; the container
/// itself is excluded so changing counters around the table do not count as
/// a refresh.
fn rows_fingerprint(markup: &str, rows_selector: &str) -> String {
    let selector = match Selector::parse(rows_selector) {
        Ok(selector) => selector,
        Err(_) => return markup.to_string(),
    };
    let document = Html::parse_document(markup);
    document
        .select(&selector)
        .map(|row| row.html())
        .collect::<Vec<_>>()
        .join("\n")
}
