//! Row-by-row result sinks.

use crate::error::MapperResult;
use crate::mapping::ResultObject;

/// State handed to a [`ResultHandler`] for each mapped row.
#[derive(Debug, Default)]
pub struct ResultContext {
    object: Option<ResultObject>,
    count: usize,
    stopped: bool,
}

impl ResultContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_object(&mut self, object: ResultObject) {
        self.count += 1;
        self.object = Some(object);
    }

    /// The current row, if the handler has not taken it.
    pub fn result_object(&self) -> Option<&ResultObject> {
        self.object.as_ref()
    }

    pub fn take_object(&mut self) -> Option<ResultObject> {
        self.object.take()
    }

    /// Rows delivered so far, including the current one.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Stop fetching after the current row.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Receives mapped rows one at a time instead of a materialized list.
pub trait ResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) -> MapperResult<()>;
}

impl<F> ResultHandler for F
where
    F: FnMut(&mut ResultContext) -> MapperResult<()>,
{
    fn handle_result(&mut self, context: &mut ResultContext) -> MapperResult<()> {
        self(context)
    }
}
