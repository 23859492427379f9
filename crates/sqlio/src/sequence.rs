//! Identity sequence arithmetic.
//!
//! A [`Sequence`] describes an arithmetic progression
//! `a(k) = start_value + k * increment_by` and the current position `value`
//! (the next identity the database would hand out).

use crate::error::{Error, Result};

/// Reservation record for a table identity or a named sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Catalog the sequence lives in
    pub catalog: String,
    /// Schema the sequence lives in
    pub schema: String,
    /// Table or sequence name
    pub name: String,
    /// Next value the database would assign
    pub value: i64,
    /// Step between values
    pub increment_by: i64,
    /// Progression offset
    pub start_value: i64,
    /// Upper bound, zero when unknown
    pub max_value: i64,
    /// Column data type
    pub data_type: String,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            catalog: String::new(),
            schema: String::new(),
            name: String::new(),
            value: 0,
            increment_by: 1,
            start_value: 1,
            max_value: 0,
            data_type: String::new(),
        }
    }
}

impl Sequence {
    /// Sequence positioned at `value` with a step of one
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            ..Default::default()
        }
    }

    /// Set the progression
    pub fn with_progression(mut self, start_value: i64, increment_by: i64) -> Self {
        self.start_value = start_value;
        self.increment_by = increment_by;
        self
    }

    #[inline]
    fn step(&self) -> i64 {
        self.increment_by.max(1)
    }

    /// Position after reserving `count` more values
    pub fn next_value(&self, count: i64) -> i64 {
        let inc = self.step();
        let m = (self.value - self.start_value) % inc;
        if m == 0 {
            if self.value > self.start_value {
                return self.value + count * inc;
            }
            return self.start_value + count * inc;
        }
        if m < 0 {
            return self.start_value + count * inc;
        }
        self.value - m + inc + count * inc
    }

    /// First value of a reservation of `count`
    pub fn min_value(&self, count: i64) -> i64 {
        self.next_value(count) - count * self.step()
    }

    /// Advance past `count` values and return the highest one
    ///
    /// The returned id is what a transient probe insert writes so the
    /// database counter moves past the whole block.
    pub fn compute_next_for_transient(&mut self, count: i64) -> Result<i64> {
        if count <= 0 {
            return Err(Error::sequencer(format!(
                "invalid record count for {}: {count}",
                self.name
            )));
        }
        self.value = self.next_value(count);
        Ok(self.value - self.step())
    }
}

/// A block of identities owned by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Sequence state after the reservation
    pub sequence: Sequence,
    /// First reserved identity
    pub first: i64,
    /// Number of reserved identities
    pub count: i64,
}

impl Reservation {
    /// Reserve `count` values from `sequence` without touching the database
    pub fn from_sequence(mut sequence: Sequence, count: i64) -> Result<Self> {
        let first = sequence.min_value(count);
        sequence.compute_next_for_transient(count)?;
        Ok(Self {
            sequence,
            first,
            count,
        })
    }

    /// Step between reserved identities
    #[inline]
    pub fn increment_by(&self) -> i64 {
        self.sequence.increment_by.max(1)
    }

    /// Highest reserved identity
    #[inline]
    pub fn last(&self) -> i64 {
        self.first + (self.count - 1) * self.increment_by()
    }

    /// Reserved identities in ascending order
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.count).map(move |i| self.first + i * self.increment_by())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_value_aligned() {
        let s = Sequence::new("t", 15).with_progression(5, 10);
        assert_eq!(s.next_value(3), 45);
        assert_eq!(s.min_value(3), 15);
    }

    #[test]
    fn test_next_value_clamped_to_start() {
        let s = Sequence::new("t", 0).with_progression(5, 10);
        assert_eq!(s.next_value(3), 35);
        assert_eq!(s.min_value(3), 5);
    }

    #[test]
    fn test_next_value_unaligned_rounds_up() {
        let s = Sequence::new("t", 17).with_progression(5, 10);
        // next aligned value after 17 is 25
        assert_eq!(s.min_value(2), 25);
        assert_eq!(s.next_value(2), 45);
    }

    #[test]
    fn test_transient_returns_highest_reserved() {
        let mut s = Sequence::new("t", 15).with_progression(5, 10);
        assert_eq!(s.compute_next_for_transient(3).unwrap(), 35);
        assert_eq!(s.value, 45);
    }

    #[test]
    fn test_transient_rejects_non_positive() {
        let mut s = Sequence::new("t", 1);
        assert!(s.compute_next_for_transient(0).is_err());
        assert!(s.compute_next_for_transient(-1).is_err());
        assert_eq!(s.value, 1);
    }

    #[test]
    fn test_reservation_range() {
        let r = Reservation::from_sequence(Sequence::new("t", 15).with_progression(5, 10), 3)
            .unwrap();
        assert_eq!(r.ids().collect::<Vec<_>>(), vec![15, 25, 35]);
        assert_eq!(r.last(), 35);
        assert_eq!(r.sequence.value, 45);
    }

    #[test]
    fn test_reserved_block_spans_count_values() {
        let sequences = [
            Sequence::new("t", 15).with_progression(5, 10),
            Sequence::new("t", 1),
            Sequence::new("t", 7).with_progression(1, 3),
            Sequence::new("t", 0).with_progression(2, 2),
        ];
        for seq in sequences {
            let inc = seq.increment_by;
            for k in 1..=6 {
                let r = Reservation::from_sequence(seq.clone(), k).unwrap();
                assert_eq!(r.last() - r.first, (k - 1) * inc, "{seq:?} k={k}");
                assert_eq!(r.ids().count() as i64, k);
                assert_eq!(r.ids().last(), Some(r.last()));
                assert_eq!(r.sequence.value - r.first, k * inc);

                let mut cursor = seq.clone();
                assert_eq!(cursor.compute_next_for_transient(k).unwrap(), r.last());
            }
        }
    }

    #[test]
    fn test_zero_increment_treated_as_one() {
        let s = Sequence::new("t", 10).with_progression(1, 0);
        assert_eq!(s.next_value(2), 12);
    }
}
