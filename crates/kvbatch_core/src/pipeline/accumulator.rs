//! Batch accumulation.

use crate::pipeline::encoder::EncodedPair;

/// An ordered group of pairs committed in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: u64,
    first_line: u64,
    pairs: Vec<EncodedPair>,
}

impl Batch {
    /// Position of the batch in emission order, from 0.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Input line number of the first pair.
    #[must_use]
    pub fn first_line(&self) -> u64 {
        self.first_line
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the batch has no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The pairs, in input order.
    #[must_use]
    pub fn pairs(&self) -> &[EncodedPair] {
        &self.pairs
    }

    /// Consumes the batch and returns its pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<EncodedPair> {
        self.pairs
    }
}

/// Buffers pairs and cuts them into batches of at most `batch_size`.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    buffer: Vec<EncodedPair>,
    first_line: u64,
    emitted: u64,
}

impl BatchAccumulator {
    /// Creates an accumulator. A `batch_size` of 0 behaves as 1.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size.min(4096)),
            first_line: 0,
            emitted: 0,
        }
    }

    /// Appends a pair read from `line_number`; returns the batch it
    /// completes, if any.
    pub fn push(&mut self, line_number: u64, pair: EncodedPair) -> Option<Batch> {
        if self.buffer.is_empty() {
            self.first_line = line_number;
        }
        self.buffer.push(pair);
        if self.buffer.len() >= self.batch_size {
            Some(self.cut())
        } else {
            None
        }
    }

    /// Returns the final, possibly short batch, if any pairs are buffered.
    #[must_use]
    pub fn finish(mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.cut())
        }
    }

    fn cut(&mut self) -> Batch {
        let pairs = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.batch_size.min(4096)),
        );
        let batch = Batch {
            index: self.emitted,
            first_line: self.first_line,
            pairs,
        };
        self.emitted += 1;
        batch
    }
}
