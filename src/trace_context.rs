//! `TraceContext` bundles a stopped trace's buffer together with the
//! thread-name map needed to render `thread_name` metadata events, ready to
//! be handed to an exporter.

use std::collections::HashMap;

use crate::trace_buffer::TraceBuffer;

pub struct TraceContext {
    buffer: Option<Box<dyn TraceBuffer>>,
    thread_names: HashMap<u32, String>,
}

impl TraceContext {
    pub fn new(buffer: Option<Box<dyn TraceBuffer>>, thread_names: HashMap<u32, String>) -> Self {
        TraceContext {
            buffer,
            thread_names,
        }
    }

    pub fn buffer(&self) -> Option<&dyn TraceBuffer> {
        self.buffer.as_deref()
    }

    pub fn thread_names(&self) -> &HashMap<u32, String> {
        &self.thread_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_buffer() {
        let ctx = TraceContext::new(None, HashMap::new());
        assert!(ctx.buffer().is_none());
        assert!(ctx.thread_names().is_empty());
    }
}
