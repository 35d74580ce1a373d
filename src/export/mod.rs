//! Chrome Trace Event JSON export — a streaming serializer over a
//! `TraceContext`'s buffer and thread-name map.

mod file_sink;

pub use file_sink::FileStopCallback;

use crate::trace_context::TraceContext;

fn thread_name_to_json(pid: u32, tid: u32, name: &str) -> String {
    format!(
        "{{\"name\":\"thread_name\",\"ph\":\"M\",\"pid\":{},\"tid\":{},\"args\":{{\"name\":{}}}}}",
        pid,
        tid,
        crate::string_utils::to_json_string(name)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Opening,
    FirstThread,
    OtherThreads,
    FirstEvent,
    OtherEvents,
    Footer,
    Dead,
}

/// Streams `{"traceEvents":[...]}` out of a `TraceContext`: first the
/// `thread_name` metadata events, then every event in buffer order.
pub struct JsonExport<'a> {
    context: &'a TraceContext,
    pid: u32,
    thread_iter: std::collections::hash_map::Iter<'a, u32, String>,
    event_iter: Box<dyn Iterator<Item = (u32, &'a crate::trace_event::TraceEvent)> + 'a>,
    state: State,
    cache: String,
}

impl<'a> JsonExport<'a> {
    pub fn new(context: &'a TraceContext) -> Self {
        let event_iter: Box<dyn Iterator<Item = (u32, &'a crate::trace_event::TraceEvent)>> =
            match context.buffer() {
                Some(buffer) => Box::new(
                    buffer
                        .chunks()
                        .iter()
                        .flat_map(|chunk| chunk.iter().map(move |ev| (chunk.thread_id(), ev))),
                ),
                None => Box::new(std::iter::empty()),
            };

        JsonExport {
            context,
            pid: crate::platform::current_process_id(),
            thread_iter: context.thread_names().iter(),
            event_iter,
            state: State::Opening,
            cache: String::new(),
        }
    }

    pub fn done(&self) -> bool {
        self.state == State::Dead && self.cache.is_empty()
    }

    /// Fills as much of `out` as the export has ready, returning the
    /// number of bytes written. Call repeatedly until it returns 0 (and
    /// `done()` is true) to drain the whole export.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut cursor = 0;

        while cursor < out.len() && !self.done() {
            if !self.cache.is_empty() {
                let take = self.cache.len().min(out.len() - cursor);
                out[cursor..cursor + take].copy_from_slice(&self.cache.as_bytes()[..take]);
                self.cache.drain(..take);
                cursor += take;
                if cursor >= out.len() {
                    break;
                }
            }

            match self.state {
                State::Opening => {
                    self.cache = "{\"traceEvents\":[".to_string();
                    self.state = if self.context.thread_names().is_empty() {
                        State::FirstEvent
                    } else {
                        State::FirstThread
                    };
                }
                State::FirstThread | State::OtherThreads => {
                    if self.state == State::OtherThreads {
                        self.cache.push(',');
                    }
                    match self.thread_iter.next() {
                        Some((tid, name)) => {
                            self.cache
                                .push_str(&thread_name_to_json(self.pid, *tid, name));
                            self.state = State::OtherThreads;
                        }
                        None => self.state = State::FirstEvent,
                    }
                }
                State::FirstEvent | State::OtherEvents => {
                    if self.state == State::OtherEvents {
                        self.cache.push(',');
                    }
                    match self.event_iter.next() {
                        Some((tid, event)) => {
                            self.cache.push_str(&event.to_json(tid, self.pid));
                            self.state = State::OtherEvents;
                        }
                        None => self.state = State::Footer,
                    }
                }
                State::Footer => {
                    self.cache = "]}".to_string();
                    self.state = State::Dead;
                }
                State::Dead => {}
            }
        }

        cursor
    }

    /// Drains the whole export into a single `String`. `read()` fills a
    /// fixed-size buffer and can split a multi-byte UTF-8 character across
    /// two calls, so bytes are accumulated and decoded once at the end
    /// rather than per-chunk.
    pub fn to_string(mut self) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf);
            raw.extend_from_slice(&buf[..n]);
            if n == 0 && self.done() {
                break;
            }
        }
        String::from_utf8(raw).expect("export is always valid UTF-8")
    }
}
