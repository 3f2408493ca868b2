//! Bucketing values (ages, BMIs) into ranges for the summaries.
use itertools::{EitherOrBoth, Itertools};
use std::{borrow::Borrow, fmt};

/// Range where lower bound is inclusive, upper bound is exclusive or unbounded.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Range<T>(T, Option<T>);

impl<T> Range<T>
where
    T: Ord,
{
    pub fn new(from: T, to: Option<T>) -> Self {
        if let Some(ref to) = to {
            assert!(from < *to, "ranges must go from low to high");
        }
        Range(from, to)
    }

    pub fn contains(&self, val: &T) -> bool {
        match &self.1 {
            Some(end) => val >= &self.0 && val < end,
            None => val >= &self.0,
        }
    }
}

impl<T> fmt::Display for Range<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(end) = &self.1 {
            write!(f, "{} - {}", self.0, end)
        } else {
            write!(f, "{}+", self.0)
        }
    }
}

/// An ordered list of ranges to count values into.
///
/// Ranges may overlap or leave gaps; a value is counted once for every range that contains it.
#[derive(Debug, Clone)]
pub struct RangeSet<T> {
    ranges: Vec<Range<T>>,
}

impl<T> RangeSet<T> {
    pub fn new(ranges: Vec<Range<T>>) -> Self {
        Self { ranges }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<T>> + '_ {
        self.ranges.iter()
    }
}

impl<T> RangeSet<T>
where
    T: Ord + Clone,
{
    /// Back to back ranges between consecutive `bounds`, then one open ended range from the last
    /// bound. `[18, 35, 50]` gives `18 - 35`, `35 - 50`, `50+`.
    pub fn from_bounds(bounds: impl IntoIterator<Item = T>) -> Self {
        let bounds: Vec<T> = bounds.into_iter().collect();
        let mut ranges: Vec<Range<T>> = bounds
            .iter()
            .tuple_windows()
            .map(|(from, to)| Range::new(from.clone(), Some(to.clone())))
            .collect();
        if let Some(last) = bounds.last() {
            ranges.push(Range::new(last.clone(), None));
        }
        Self { ranges }
    }
}

impl<T> RangeSet<T>
where
    T: Ord,
{
    pub fn bucket_values<I, B>(self, values: I) -> RangeSetCounts<T>
    where
        I: Iterator<Item = B>,
        B: Borrow<T>,
    {
        let mut buckets = vec![0usize; self.ranges.len()];
        for value in values {
            for (idx, bucket) in self.ranges.iter().enumerate() {
                if bucket.contains(value.borrow()) {
                    buckets[idx] += 1;
                }
            }
        }
        RangeSetCounts {
            set: self,
            counts: buckets,
        }
    }

    /// Like [`RangeSet::bucket_values`], with an extra bucket at the end counting `None`s.
    pub fn bucket_values_with_missing<I, B>(self, values: I) -> RangeSetCountsWithMissing<T>
    where
        I: Iterator<Item = Option<B>>,
        B: Borrow<T>,
    {
        let mut buckets = vec![0usize; self.ranges.len() + 1];
        let last = self.ranges.len();
        for value in values {
            if let Some(value) = value {
                for (idx, bucket) in self.ranges.iter().enumerate() {
                    if bucket.contains(value.borrow()) {
                        buckets[idx] += 1;
                    }
                }
            } else {
                buckets[last] += 1;
            }
        }
        RangeSetCountsWithMissing {
            set: self,
            counts: buckets,
        }
    }
}

/// A range set with values bucketed, and bucket sizes recorded.
pub struct RangeSetCounts<T> {
    set: RangeSet<T>,
    counts: Vec<usize>,
}

impl<T> RangeSetCounts<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&Range<T>, usize)> {
        self.set.iter().zip_eq(self.counts.iter().copied())
    }
}

/// Bucket counts plus a count of missing values.
pub struct RangeSetCountsWithMissing<T> {
    set: RangeSet<T>,
    counts: Vec<usize>,
}

impl<T> RangeSetCountsWithMissing<T>
where
    T: fmt::Display,
{
    /// Range labels with their counts. The missing count comes last, labelled "missing data".
    pub fn for_display(&self) -> impl Iterator<Item = (&dyn fmt::Display, usize)> {
        self.set
            .iter()
            .zip_longest(self.counts.iter().copied())
            .map(|el| match el {
                EitherOrBoth::Left(_) => unreachable!(),
                EitherOrBoth::Right(count) => (&"missing data" as &dyn fmt::Display, count),
                EitherOrBoth::Both(range, count) => (range as &dyn fmt::Display, count),
            })
    }
}
