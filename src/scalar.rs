//! The [`Scalar`] trait that loss and model code is written against.
//!
//! A loss written as `fn loss<T: Scalar<Float = f64>>(..) -> T` runs unchanged
//! on plain `f64` (evaluation), [`Dual<f64>`] (Jacobian-vector products) and
//! [`Reverse<f64>`] (vector-Jacobian products).

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::dual::Dual;
use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::TapeThreadLocal;

/// Numeric type usable inside a differentiated loss or model.
pub trait Scalar:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + 'static
{
    /// The underlying primitive float.
    type Float: Float;

    /// Lift a plain float (zero derivative).
    fn from_f(val: Self::Float) -> Self;

    /// Primal value.
    fn value(&self) -> Self::Float;

    #[inline]
    fn zero() -> Self {
        Self::from_f(<Self::Float as num_traits::Zero>::zero())
    }

    #[inline]
    fn one() -> Self {
        Self::from_f(<Self::Float as num_traits::One>::one())
    }

    fn recip(self) -> Self;
    fn sqrt(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn ln_1p(self) -> Self;
    fn tanh(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn abs(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
}

macro_rules! forward_elementals {
    ($ty:ty) => {
        #[inline]
        fn recip(self) -> Self {
            <$ty>::recip(self)
        }
        #[inline]
        fn sqrt(self) -> Self {
            <$ty>::sqrt(self)
        }
        #[inline]
        fn powi(self, n: i32) -> Self {
            <$ty>::powi(self, n)
        }
        #[inline]
        fn exp(self) -> Self {
            <$ty>::exp(self)
        }
        #[inline]
        fn ln(self) -> Self {
            <$ty>::ln(self)
        }
        #[inline]
        fn ln_1p(self) -> Self {
            <$ty>::ln_1p(self)
        }
        #[inline]
        fn tanh(self) -> Self {
            <$ty>::tanh(self)
        }
        #[inline]
        fn sin(self) -> Self {
            <$ty>::sin(self)
        }
        #[inline]
        fn cos(self) -> Self {
            <$ty>::cos(self)
        }
        #[inline]
        fn abs(self) -> Self {
            <$ty>::abs(self)
        }
        #[inline]
        fn max(self, other: Self) -> Self {
            <$ty>::max(self, other)
        }
        #[inline]
        fn min(self, other: Self) -> Self {
            <$ty>::min(self, other)
        }
    };
}

macro_rules! impl_scalar_primitive {
    ($f:ty) => {
        impl Scalar for $f {
            type Float = $f;

            #[inline]
            fn from_f(val: $f) -> Self {
                val
            }

            #[inline]
            fn value(&self) -> $f {
                *self
            }

            forward_elementals!($f);
        }
    };
}

impl_scalar_primitive!(f32);
impl_scalar_primitive!(f64);

impl<F: Float> Scalar for Dual<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Dual::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        self.re
    }

    forward_elementals!(Dual<F>);
}

impl<F: TapeThreadLocal> Scalar for Reverse<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Reverse::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    forward_elementals!(Reverse<F>);
}
