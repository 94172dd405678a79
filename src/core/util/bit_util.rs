// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

/// Logical (zero filling) right shift for signed integers, Java's `>>>`.
pub trait UnsignedShift: Sized {
    fn unsigned_shift(&self, by: usize) -> Self;
}

macro_rules! impl_unsigned_shift {
    ($type: ty, $utype: ty) => {
        impl UnsignedShift for $type {
            #[inline]
            fn unsigned_shift(&self, by: usize) -> Self {
                (*self as $utype >> by) as $type
            }
        }
    };
}

impl_unsigned_shift!(i8, u8);
impl_unsigned_shift!(i16, u16);
impl_unsigned_shift!(i32, u32);
impl_unsigned_shift!(i64, u64);
impl_unsigned_shift!(isize, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_shift() {
        assert_eq!((-1i32).unsigned_shift(28), 0xf);
        assert_eq!((-8i64).unsigned_shift(1), i64::max_value() - 3);
        assert_eq!(12i64.unsigned_shift(2), 3);
    }
}
