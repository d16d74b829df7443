/// Pagination: single pages with cursors, and lazy multi-page iteration

use crate::model::{decode, Model};
use dmap_core::executor::PageOutput;
use dmap_core::serializer::{decode_cursor_token, encode_cursor_token, serialize_cursor};
use dmap_core::{Document, Error, Item, ModelSchema, Result};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

/// One page of results
#[derive(Debug)]
pub struct PageResult<M> {
    pub items: Vec<M>,
    /// Where the next page starts, as plain key values
    pub cursor: Option<Document>,
    pub count: usize,
}

impl<M: Model> PageResult<M> {
    pub(crate) fn from_output(schema: &ModelSchema, output: PageOutput) -> Result<Self> {
        let items = output
            .items
            .iter()
            .map(|item| decode::<M>(schema, item))
            .collect::<Result<Vec<M>>>()?;
        let cursor = output.last_evaluated_key.as_ref().map(serialize_cursor).transpose()?;
        Ok(Self {
            count: items.len(),
            items,
            cursor,
        })
    }
}

impl<M> PageResult<M> {
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// The cursor as an opaque string, for handing to clients.
    pub fn cursor_token(&self) -> Result<Option<String>> {
        self.cursor.as_ref().map(encode_cursor_token).transpose()
    }

    /// Cursor from a token produced by [`PageResult::cursor_token`].
    pub fn cursor_from_token(token: &str) -> Result<Document> {
        decode_cursor_token(token)
    }
}

pub(crate) type FetchPage = Box<dyn FnMut(Option<Item>) -> Result<PageOutput>>;

/// Lazy iterator over every matching item, fetching pages on demand.
///
/// Stops after the builder's limit, even in the middle of a page. The first
/// error ends the iteration.
pub struct ModelIter<M> {
    schema: Arc<ModelSchema>,
    fetch: FetchPage,
    buffer: VecDeque<Item>,
    next_key: Option<Item>,
    exhausted: bool,
    remaining: Option<usize>,
    pending_error: Option<Error>,
    pages: usize,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ModelIter<M> {
    pub(crate) fn new(schema: Arc<ModelSchema>, limit: Option<usize>, fetch: FetchPage) -> Self {
        Self {
            schema,
            fetch,
            buffer: VecDeque::new(),
            next_key: None,
            exhausted: false,
            remaining: limit,
            pending_error: None,
            pages: 0,
            _model: PhantomData,
        }
    }

    /// An iterator that yields `error` once and ends.
    pub(crate) fn failed(schema: Arc<ModelSchema>, error: Error) -> Self {
        let mut iter = Self::new(schema, None, Box::new(|_| Ok(PageOutput::default())));
        iter.pending_error = Some(error);
        iter.exhausted = true;
        iter
    }

    /// Pages requested so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl<M: Model> Iterator for ModelIter<M> {
    type Item = Result<M>;

    fn next(&mut self) -> Option<Result<M>> {
        if let Some(error) = self.pending_error.take() {
            return Some(Err(error));
        }
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            if let Some(item) = self.buffer.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(decode::<M>(&self.schema, &item));
            }
            if self.exhausted {
                return None;
            }
            match (self.fetch)(self.next_key.take()) {
                Ok(page) => {
                    self.pages += 1;
                    self.exhausted = page.last_evaluated_key.is_none();
                    self.next_key = page.last_evaluated_key;
                    self.buffer.extend(page.items);
                }
                Err(error) => {
                    self.exhausted = true;
                    return Some(Err(error));
                }
            }
        }
    }
}
