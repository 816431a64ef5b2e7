//! Explicit narrowing casts

#![allow(clippy::as_conversions, clippy::cast_possible_truncation)]

/// Keeps the low bits of a wider integer
pub trait TruncatingCast<U> {
    fn truncating_cast(self) -> U;
}

macro_rules! impl_truncating_cast {
    ($($lhs:ty => $rhs:ty,)+) => {$(
        impl TruncatingCast<$rhs> for $lhs {
            #[inline]
            fn truncating_cast(self) -> $rhs {
                self as $rhs
            }
        }
    )+};
}

impl_truncating_cast!(
    u32 => u8,
    u64 => u8,
);
