//! Enumeration of set partitions and subsets in lexicographic order.
//!
//! Partitions are generated through restricted growth strings (Orlov,
//! "Efficient Generation of Set Partitions", 2002; Knuth, TAOCP Vol. 4,
//! Fasc. 3). Subsets are generated by binary counting over a bit mask.

/// Stepper over all partitions of `{0, 1, ..., n-1}` in lexicographic order
/// of their restricted growth strings.
///
/// The first partition is the single all-in-one block, the last one is the
/// all-singletons partition. The usual driving loop yields the current
/// partition first and then advances:
///
/// ```
/// use fog_coalsim::combinatorics::LexicographicPartition;
///
/// let mut part = LexicographicPartition::new(3);
/// let mut count = 0;
/// while part.has_next() {
///     count += 1;
///     part.advance();
/// }
/// assert_eq!(count, 5); // Bell(3)
/// ```
pub struct LexicographicPartition {
    n: usize,
    // kappa[i] is the block index of element i; m[i] tracks the running
    // maximum of kappa[0..=i], so m[i] + 1 blocks exist among the first
    // i + 1 elements.
    kappa: Vec<usize>,
    m: Vec<usize>,
    has_prev: bool,
    has_next: bool,
}

impl LexicographicPartition {
    /// Stepper positioned at the first partition (one block). Panics if
    /// `n == 0`.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "number of elements must be positive");
        Self {
            n,
            kappa: vec![0; n],
            m: vec![0; n],
            has_prev: false,
            has_next: true,
        }
    }

    /// Stepper positioned at the last partition (all singletons).
    pub fn new_last(n: usize) -> Self {
        assert!(n > 0, "number of elements must be positive");
        let mut part = Self::new(n);
        for i in 1..n {
            part.kappa[i] = i;
            part.m[i] = i;
        }
        part.has_prev = true;
        part
    }

    pub fn num_elements(&self) -> usize {
        self.n
    }

    /// Number of blocks of the current partition.
    pub fn num_blocks(&self) -> usize {
        self.m[self.n - 1] + 1
    }

    /// True while the current partition has not yet been consumed by the
    /// yield-then-advance loop.
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// True while the current partition has not yet been consumed by the
    /// mirror yield-then-retreat loop.
    pub fn has_prev(&self) -> bool {
        self.has_prev
    }

    /// Block index of each element in the current partition.
    pub fn blocks(&self) -> &[usize] {
        &self.kappa
    }

    /// Steps to the lexicographically next restricted growth string.
    /// Returns false once the all-singletons partition has been passed.
    pub fn advance(&mut self) -> bool {
        if !self.has_next {
            return false;
        }

        // The all-singletons partition is the lexicographic maximum.
        self.has_next = self.m[self.n - 1] + 1 < self.n;

        for i in (1..self.n).rev() {
            if self.kappa[i] <= self.m[i - 1] {
                self.kappa[i] += 1;
                let new_max = self.m[i].max(self.kappa[i]);
                self.m[i] = new_max;
                for j in i + 1..self.n {
                    self.kappa[j] = 0;
                    self.m[j] = new_max;
                }
                self.has_prev = true;
                break;
            }
        }

        true
    }

    /// Steps to the lexicographically previous restricted growth string.
    pub fn retreat(&mut self) -> bool {
        if !self.has_prev {
            return false;
        }

        // The single-block partition is the lexicographic minimum.
        self.has_prev = self.m[self.n - 1] + 1 > 1;

        for i in (1..self.n).rev() {
            if self.kappa[i] > 0 {
                self.kappa[i] -= 1;
                let m_prev = self.m[i - 1];
                self.m[i] = m_prev;
                for j in i + 1..self.n {
                    let new_max = m_prev + j - i;
                    self.kappa[j] = new_max;
                    self.m[j] = new_max;
                }
                self.has_next = true;
                break;
            }
        }

        true
    }

    /// Splits `items` into the blocks of the current partition. Panics if
    /// the slice length does not match the element count.
    pub fn groups<T: Clone>(&self, items: &[T]) -> Vec<Vec<T>> {
        assert_eq!(items.len(), self.n, "size does not match");

        let mut subs = vec![Vec::new(); self.num_blocks()];
        for (i, item) in items.iter().enumerate() {
            subs[self.kappa[i]].push(item.clone());
        }
        subs
    }
}

/// Iterator over all partitions of `{0, ..., n-1}`, each as a list of
/// index blocks. Yields exactly `bell_number(n)` partitions.
pub fn partitions(n: usize) -> Partitions {
    Partitions {
        inner: LexicographicPartition::new(n),
        indices: (0..n).collect(),
    }
}

pub struct Partitions {
    inner: LexicographicPartition,
    indices: Vec<usize>,
}

impl Iterator for Partitions {
    type Item = Vec<Vec<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.inner.has_next() {
            return None;
        }
        let groups = self.inner.groups(&self.indices);
        self.inner.advance();
        Some(groups)
    }
}

/// Stepper over the non-empty subsets of `{0, ..., n-1}`, represented as
/// bit masks walked in binary counting order (`1, 2, 3, ..., 2^n - 1`).
/// Valid for `n <= 32`.
pub struct SubsetEnumerator {
    n: usize,
    mask: u32,
    has_next: bool,
}

impl SubsetEnumerator {
    pub fn new(n: usize) -> Self {
        assert!(n > 0 && n <= 32, "number of elements must be in 1..=32");
        Self {
            n,
            mask: 1,
            has_next: true,
        }
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Current subset as a bit mask over element indices.
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Members of the current subset in increasing index order.
    pub fn members(&self) -> Vec<usize> {
        (0..self.n).filter(|i| self.mask & (1 << i) != 0).collect()
    }

    /// Picks the current subset out of `items`.
    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        assert_eq!(items.len(), self.n, "size does not match");
        items
            .iter()
            .enumerate()
            .filter(|(i, _)| self.mask & (1 << i) != 0)
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// Steps to the next subset; returns false once the full set has been
    /// passed.
    pub fn advance(&mut self) -> bool {
        if !self.has_next {
            return false;
        }
        let full = if self.n == 32 {
            u32::MAX
        } else {
            (1u32 << self.n) - 1
        };
        self.has_next = self.mask < full;
        if self.has_next {
            self.mask += 1;
        }
        true
    }

    /// Restarts from the first subset.
    pub fn reset(&mut self) {
        self.mask = 1;
        self.has_next = true;
    }
}

/// Iterator over the non-empty subsets of `{0, ..., n-1}` as bit masks.
pub fn subsets(n: usize) -> Subsets {
    Subsets {
        inner: SubsetEnumerator::new(n),
    }
}

pub struct Subsets {
    inner: SubsetEnumerator,
}

impl Iterator for Subsets {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.inner.has_next() {
            return None;
        }
        let mask = self.inner.mask();
        self.inner.advance();
        Some(mask)
    }
}

/// n-th Bell number via the Bell triangle recurrence.
pub fn bell_number(n: usize) -> u64 {
    if n == 0 {
        return 1;
    }
    let mut row = vec![1u64];
    for _ in 1..n {
        let mut next = Vec::with_capacity(row.len() + 1);
        next.push(row[row.len() - 1]);
        for &x in &row {
            let last = next[next.len() - 1];
            next.push(last + x);
        }
        row = next;
    }
    row[row.len() - 1]
}
