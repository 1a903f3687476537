//! Resumable page-by-page pull sequence.
//!
//! A [`Pager`] drains its leftover buffer (FIFO) before asking the page
//! callback for more. Items are removed from the buffer as they are yielded,
//! so after an aborted consumer the buffer holds exactly the undelivered
//! items. The pager state is serializable; resuming means deserializing it
//! and pulling again. The stream returned by [`Pager::fetch`] itself has no
//! replay capability.

use std::collections::VecDeque;
use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Leftover buffer plus page cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pager<T> {
    leftover: VecDeque<T>,
    next_page: usize,
    exhausted: bool,
}

impl<T> Default for Pager<T> {
    fn default() -> Self {
        Self {
            leftover: VecDeque::new(),
            next_page: 0,
            exhausted: false,
        }
    }
}

impl<T> Pager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a buffer of items left over by an interrupted attempt.
    pub fn with_leftover(leftover: impl IntoIterator<Item = T>) -> Self {
        Self {
            leftover: leftover.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Items fetched but not yet delivered.
    pub fn remaining(&self) -> &VecDeque<T> {
        &self.leftover
    }

    /// Index of the page the callback will be asked for next.
    pub fn next_page(&self) -> usize {
        self.next_page
    }

    /// `true` once the callback reported no more data and the buffer is empty.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.leftover.is_empty()
    }

    /// Pull one item, fetching a page when the buffer is empty.
    ///
    /// A callback result of `None` or an empty page ends the sequence. A
    /// failing fetch leaves the cursor in place so the page is requested
    /// again on the next pull.
    pub async fn next_item<F, Fut>(&mut self, fetch_page: &mut F) -> Result<Option<T>, SyncError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<Option<Vec<T>>, SyncError>>,
    {
        if let Some(item) = self.leftover.pop_front() {
            return Ok(Some(item));
        }
        if self.exhausted {
            return Ok(None);
        }

        match fetch_page(self.next_page).await? {
            Some(page) if !page.is_empty() => {
                self.next_page += 1;
                self.leftover.extend(page);
                Ok(self.leftover.pop_front())
            }
            _ => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Lazy stream over the buffer then the remaining pages.
    ///
    /// The stream borrows the pager; once it is dropped the pager reflects
    /// how far the consumer got. A fetch error is yielded once and ends the
    /// stream.
    pub fn fetch<'a, F, Fut>(&'a mut self, fetch_page: F) -> BoxStream<'a, Result<T, SyncError>>
    where
        T: Send + 'a,
        F: FnMut(usize) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Option<Vec<T>>, SyncError>> + Send + 'a,
    {
        stream::unfold(
            (self, fetch_page, false),
            |(pager, mut fetch_page, failed)| async move {
                if failed {
                    return None;
                }
                match pager.next_item(&mut fetch_page).await {
                    Ok(Some(item)) => Some((Ok(item), (pager, fetch_page, false))),
                    Ok(None) => None,
                    Err(err) => Some((Err(err), (pager, fetch_page, true))),
                }
            },
        )
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pages(data: Vec<Vec<u32>>) -> impl FnMut(usize) -> futures::future::Ready<Result<Option<Vec<u32>>, SyncError>> {
        move |page| futures::future::ready(Ok(data.get(page).cloned()))
    }

    #[tokio::test]
    async fn drains_leftover_before_fetching() {
        let mut pager = Pager::with_leftover(vec![1, 2]);
        let items: Vec<u32> = pager
            .fetch(pages(vec![vec![3, 4], vec![5]]))
            .try_collect()
            .await
            .expect("collect");
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert!(pager.is_exhausted());
    }

    #[tokio::test]
    async fn empty_page_terminates_early() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut pager: Pager<u32> = Pager::new();
        let items: Vec<u32> = pager
            .fetch(move |page| {
                counter.fetch_add(1, Ordering::SeqCst);
                let page = match page {
                    0 => Some(vec![1]),
                    1 => Some(vec![]),
                    _ => Some(vec![99]),
                };
                futures::future::ready(Ok(page))
            })
            .try_collect()
            .await
            .expect("collect");
        assert_eq!(items, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn aborted_consumer_leaves_exact_remainder() {
        let mut pager: Pager<u32> = Pager::new();
        {
            let mut stream = pager.fetch(pages(vec![vec![1, 2, 3], vec![4]]));
            assert_eq!(stream.next().await.transpose().expect("item"), Some(1));
        }
        assert_eq!(pager.remaining(), &VecDeque::from(vec![2, 3]));
        assert_eq!(pager.next_page(), 1);

        let saved = serde_json::to_string(&pager).expect("serialize");
        let mut resumed: Pager<u32> = serde_json::from_str(&saved).expect("deserialize");
        let rest: Vec<u32> = resumed
            .fetch(pages(vec![vec![1, 2, 3], vec![4]]))
            .try_collect()
            .await
            .expect("collect");
        assert_eq!(rest, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_cursor() {
        let mut pager: Pager<u32> = Pager::new();
        let mut stream = pager.fetch(|_| {
            futures::future::ready(Err(SyncError::Api {
                status: Some(503),
                message: "down".to_string(),
            }))
        });
        assert!(matches!(stream.next().await, Some(Err(SyncError::Api { .. }))));
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(pager.next_page(), 0);
        assert!(!pager.is_exhausted());
    }
}
