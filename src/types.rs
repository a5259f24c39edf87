// SPDX-License-Identifier: MIT
//! Scalar value types that have no direct Rust primitive

/// An arbitrary-precision-style decimal: `coefficient * 10 ^ exponent`.
///
/// The coefficient is bounded to i128, which covers every value this
/// codec is asked to move. Signed zero is not representable; `0d0` has
/// the unique zero-length wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    coefficient: i128,
    exponent: i32,
}

impl Decimal {
    pub fn new(coefficient: i128, exponent: i32) -> Self {
        Self { coefficient, exponent }
    }

    pub const ZERO: Decimal = Decimal { coefficient: 0, exponent: 0 };

    pub fn coefficient(&self) -> i128 {
        self.coefficient
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient == 0
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal::new(v as i128, 0)
    }
}

/// A point in time as milliseconds since the Unix epoch, with an
/// optional UTC offset in minutes. `None` means the offset is unknown,
/// which is distinct from an offset of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    millis: i64,
    offset_minutes: Option<i32>,
}

impl Timestamp {
    /// A timestamp with a known UTC offset
    pub fn new(millis: i64, offset_minutes: i32) -> Self {
        Self { millis, offset_minutes: Some(offset_minutes) }
    }

    /// A timestamp whose local offset is unknown
    pub fn unknown_offset(millis: i64) -> Self {
        Self { millis, offset_minutes: None }
    }

    /// A timestamp at UTC (offset zero)
    pub fn utc(millis: i64) -> Self {
        Self::new(millis, 0)
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    pub fn offset_minutes(&self) -> Option<i32> {
        self.offset_minutes
    }
}
