//! Execution streams.
//!
//! A [`Stream`] is a FIFO of deferred work.  Enqueueing never runs anything;
//! work executes when the stream is synchronised.  [`Stream::synchronize_all`]
//! is the layer join: every stream is drained, concurrently when the
//! `parallel` feature is on, and the call returns only when all are empty.
//! Work on one stream always runs in enqueue order.
//!
//! Streams borrow for `'scope`, so queued work may capture references to
//! data that outlives the join (launch inputs, output slots).

use ab_core::StreamId;

type Work<'scope> = Box<dyn FnOnce() + Send + 'scope>;

pub struct Stream<'scope> {
    id:    StreamId,
    queue: Vec<Work<'scope>>,
}

impl<'scope> Stream<'scope> {
    pub fn new(id: StreamId) -> Self {
        Self { id, queue: Vec::new() }
    }

    /// `count` fresh streams with ids `0..count`.
    pub fn set(count: usize) -> Vec<Stream<'scope>> {
        (0..count).map(|i| Stream::new(StreamId(i as u32))).collect()
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Number of queued, not yet executed work items.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue<F>(&mut self, work: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        self.queue.push(Box::new(work));
    }

    /// Run this stream's queue to completion on the calling thread.
    pub fn synchronize(&mut self) {
        for work in self.queue.drain(..) {
            work();
        }
    }

    /// Drain every stream; returns once all are empty.
    pub fn synchronize_all(streams: &mut [Stream<'scope>]) {
        let busy = streams.iter().filter(|s| s.pending() > 0).count();
        if busy <= 1 {
            streams.iter_mut().for_each(Stream::synchronize);
            return;
        }

        #[cfg(feature = "parallel")]
        rayon::scope(|scope| {
            for stream in streams.iter_mut() {
                scope.spawn(move |_| stream.synchronize());
            }
        });

        #[cfg(not(feature = "parallel"))]
        streams.iter_mut().for_each(Stream::synchronize);
    }
}

impl std::fmt::Debug for Stream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("pending", &self.queue.len())
            .finish()
    }
}
