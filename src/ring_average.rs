//! Fixed-capacity sliding window with an O(1) running average.

#[derive(Clone, Debug)]
pub struct RingAverage {
    values: Vec<f64>,
    capacity: usize,
    head: usize,
    sum: f64,
}

impl RingAverage {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            sum: 0.0,
        }
    }

    /// Inserts a value (overwriting the oldest one once full) and returns the average of the
    /// values currently held.
    pub fn add(&mut self, value: f64) -> f64 {
        if self.values.len() < self.capacity {
            self.values.push(value);
        } else {
            self.sum -= self.values[self.head];
            self.values[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
        self.sum += value;
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
