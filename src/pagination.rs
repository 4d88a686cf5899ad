//! Lazy pagination over server-driven cursor pages.
//!
//! The API communicates pagination through the `Link` response header; the
//! server, not the client, decides where the next page lives. [`PageStream`]
//! turns a per-page fetch function into a pull-based `Stream` of items that
//! fetches at most one page ahead of consumption and stops as soon as a page
//! carries no `next` relation.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::error::ApiError;

/// Pagination relations extracted from a `Link` response header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkRelations {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl LinkRelations {
    /// Absence of a `next` relation means the current page is the last one.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Parse a `Link` header of the form
/// `<https://host/path?page=2>; rel="next", <...>; rel="last"`.
///
/// Unknown relations and malformed segments are ignored.
pub fn parse_link_header(value: &str) -> LinkRelations {
    let mut relations = LinkRelations::default();

    for segment in value.split(',') {
        let mut parts = segment.split(';');
        let Some(target) = parts.next() else {
            continue;
        };
        let target = target.trim();
        if !(target.starts_with('<') && target.ends_with('>')) {
            continue;
        }
        let url = target[1..target.len() - 1].to_string();

        for param in parts {
            let param = param.trim();
            if let Some(rel) = param.strip_prefix("rel=") {
                match rel.trim_matches('"') {
                    "next" => relations.next = Some(url.clone()),
                    "prev" => relations.prev = Some(url.clone()),
                    "first" => relations.first = Some(url.clone()),
                    "last" => relations.last = Some(url.clone()),
                    _ => {}
                }
            }
        }
    }

    relations
}

/// A fetched page: the items plus the URL of the following page, if any.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
type FetchFn<T> =
    Box<dyn Fn(Option<String>) -> BoxFuture<'static, Result<Page<T>, ApiError>> + Send + Sync>;

/// A lazy, finite, forward-only stream of items across cursor pages.
///
/// The first fetch is called with `None`; subsequent fetches receive the
/// `next` URL reported by the previous page. An error from any fetch is
/// yielded once and terminates the stream; items already yielded stand.
pub struct PageStream<T> {
    fetch: FetchFn<T>,
    current: std::vec::IntoIter<T>,
    cursor: Option<String>,
    started: bool,
    finished: bool,
    pending: Option<BoxFuture<'static, Result<Page<T>, ApiError>>>,
}

impl<T> PageStream<T>
where
    T: Send + 'static,
{
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn(Option<String>) -> BoxFuture<'static, Result<Page<T>, ApiError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            fetch: Box::new(fetch),
            current: Vec::new().into_iter(),
            cursor: None,
            started: false,
            finished: false,
            pending: None,
        }
    }
}

impl<T> Stream for PageStream<T>
where
    T: Unpin + Send + 'static,
{
    type Item = Result<T, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(item) = this.current.next() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(fut) = this.pending.as_mut() {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.pending = None;
                        this.current = page.items.into_iter();
                        this.cursor = page.next;
                        if this.cursor.is_none() {
                            this.finished = true;
                        }
                        if this.current.len() == 0 && this.finished {
                            return Poll::Ready(None);
                        }
                        continue;
                    }
                    Poll::Ready(Err(error)) => {
                        this.pending = None;
                        this.finished = true;
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            // Fetch the first page, or the next one if the server named it.
            if !this.started {
                this.started = true;
                this.pending = Some((this.fetch)(None));
                continue;
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match this.cursor.take() {
                Some(next) => {
                    this.pending = Some((this.fetch)(Some(next)));
                }
                None => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<T> Unpin for PageStream<T> {}
