use metrics::counter;

/// Receives per-batch delivery counts from a sink.
pub trait Observer: Send + Sync {
    fn new_batch(&self, count: usize);
    fn dropped(&self, count: usize);
    fn failed(&self, count: usize);
    fn acked(&self, count: usize);
}

/// Reports batch outcomes as `metrics` counters labelled with the sink type.
#[derive(Clone, Copy, Debug)]
pub struct MetricsObserver {
    sink: &'static str,
}

impl MetricsObserver {
    pub const fn new(sink: &'static str) -> Self {
        Self { sink }
    }
}

impl Observer for MetricsObserver {
    fn new_batch(&self, count: usize) {
        counter!("output_batches_total", "sink" => self.sink).increment(1);
        counter!("output_events_total", "sink" => self.sink).increment(count as u64);
    }

    fn dropped(&self, count: usize) {
        counter!("output_events_dropped_total", "sink" => self.sink).increment(count as u64);
    }

    fn failed(&self, count: usize) {
        counter!("output_events_failed_total", "sink" => self.sink).increment(count as u64);
    }

    fn acked(&self, count: usize) {
        counter!("output_events_acked_total", "sink" => self.sink).increment(count as u64);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn new_batch(&self, _count: usize) {}
    fn dropped(&self, _count: usize) {}
    fn failed(&self, _count: usize) {}
    fn acked(&self, _count: usize) {}
}
