//! Offset-based pagination as a `Stream` of result items.
//!
//! [`OffsetPager`] turns a page-fetching function into a lazy stream. Pages
//! are requested only when the consumer has drained the previous one, so
//! dropping the stream stops all further fetching.
//!
//! ```rust,ignore
//! use futures_util::TryStreamExt;
//!
//! let guests: Vec<serde_json::Value> = client
//!     .iter_call("Account", "getVirtualGuests", vec![], CallOptions::new().limit(50))?
//!     .try_collect()
//!     .await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::error::Error;
use crate::request::ApiResponse;

/// Page size used when the caller does not set a limit.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

pin_project! {
    /// Yields the elements of successive `(offset, limit)` pages.
    ///
    /// The next page starts at `offset + len(page)`. Iteration ends after a
    /// short or empty page, or once the `softlayer-total-items` count has
    /// been fetched. A result that is not a list is yielded as a single item.
    /// Errors end the stream after being yielded; items already yielded stay
    /// yielded.
    pub struct OffsetPager<F, Fut>
    where
        F: FnMut(u32, u32) -> Fut,
        Fut: Future<Output = Result<ApiResponse, Error>>,
    {
        limit: u32,
        offset: u32,
        fetched: u64,
        buffer: VecDeque<Value>,
        done: bool,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
    }
}

impl<F, Fut> OffsetPager<F, Fut>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<ApiResponse, Error>>,
{
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `limit` is zero.
    pub fn new(limit: u32, offset: u32, fetcher: F) -> Result<Self, Error> {
        if limit == 0 {
            return Err(Error::InvalidArgument(
                "page size should be greater than zero".to_owned(),
            ));
        }
        Ok(Self {
            limit,
            offset,
            fetched: 0,
            buffer: VecDeque::new(),
            done: false,
            fetcher,
            current_fetch: None,
        })
    }
}

impl<F, Fut> Stream for OffsetPager<F, Fut>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<ApiResponse, Error>>,
{
    type Item = Result<Value, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                match fut.poll(cx) {
                    Poll::Ready(Ok(response)) => {
                        this.current_fetch.set(None);
                        match response.value {
                            Value::Array(items) => {
                                let count = items.len();
                                let page_len = u32::try_from(count).unwrap_or(u32::MAX);
                                *this.offset = this.offset.saturating_add(page_len);
                                *this.fetched = this
                                    .fetched
                                    .saturating_add(u64::try_from(count).unwrap_or(u64::MAX));
                                if page_len < *this.limit
                                    || response.total_items.is_some_and(|total| *this.fetched >= total)
                                {
                                    *this.done = true;
                                }
                                this.buffer.extend(items);
                            }
                            Value::Null => *this.done = true,
                            other => {
                                *this.done = true;
                                this.buffer.push_back(other);
                            }
                        }
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch.set(None);
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            tracing::trace!(offset = *this.offset, limit = *this.limit, "fetching page");
            let fut = (this.fetcher)(*this.offset, *this.limit);
            this.current_fetch.set(Some(fut));
        }
    }
}
