//! Rendering layer
//!
//! This module wraps the external page-rendering capability:
//! - `Session`: the capability contract (navigate, wait, read markup, find,
//!   click, read attribute), one stateful session per caller
//! - `HttpSession`: a `Session` backed by plain HTTP requests
//! - `Renderer` / `SessionRenderer`: the adapter that loads partitions and
//!   advances pages on top of a session

mod adapter;
mod http_session;

pub use adapter::{Renderer, SessionRenderer};
pub use http_session::{build_http_client, HttpSession};

use crate::partition::Partition;
use crate::SessionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Raw markup of one rendered page within a partition
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub partition: Partition,

    /// 1-based page index within the partition
    pub page_index: u32,

    pub markup: String,
}

impl PageSnapshot {
    pub fn new(partition: Partition, page_index: u32, markup: impl Into<String>) -> Self {
        Self {
            partition,
            page_index,
            markup: markup.into(),
        }
    }
}

/// Snapshot of a DOM element found through a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Selector the element was found with; used to re-locate it
    pub selector: String,

    pub tag: String,

    pub attributes: HashMap<String, String>,

    /// Whitespace-trimmed text content
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

/// Capability contract of an external rendering session
///
/// A session is stateful: it holds the current page, and operations act on
/// it in order. Only one caller may drive a session at a time, which the
/// `&mut self` receivers enforce.
#[async_trait]
pub trait Session: Send {
    /// Navigates to `url`, replacing the current page on success
    async fn navigate(&mut self, url: &Url) -> Result<(), SessionError>;

    /// Waits until `selector` matches on the current page
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), SessionError>;

    /// Returns the markup of the current page
    async fn page_source(&mut self) -> Result<String, SessionError>;

    /// Address of the current page, if the session has one
    async fn current_url(&mut self) -> Result<Option<Url>, SessionError>;

    /// Finds the first element matching `selector` on the current page
    async fn find_element(&mut self, selector: &str) -> Result<Option<Element>, SessionError>;

    /// Activates a previously found element
    async fn click(&mut self, element: &Element) -> Result<(), SessionError>;

    /// Reads an attribute of a previously found element from the live page
    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Releases the session
    async fn close(&mut self) -> Result<(), SessionError>;
}
