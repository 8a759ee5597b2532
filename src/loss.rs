use ndarray::ArrayViewD;

use crate::params::ParamView;
use crate::scalar::Scalar;

/// Per-example loss `ℓ(params, x, y) → scalar`.
///
/// The method is generic over the scalar type so one implementation serves
/// plain evaluation, forward-mode and reverse-mode passes. `x` and `y` are a
/// single example (the batch axis already removed).
///
/// ```
/// use alterproj::{Loss, ParamView, Scalar};
/// use ndarray::ArrayViewD;
///
/// struct Squared;
///
/// impl Loss for Squared {
///     fn loss<T: Scalar<Float = f64>>(
///         &self,
///         params: &ParamView<'_, T>,
///         x: ArrayViewD<'_, f64>,
///         y: ArrayViewD<'_, f64>,
///     ) -> T {
///         let r = params.scalar("p") * T::from_f(x[[0]]) - T::from_f(y[[0]]);
///         r * r
///     }
/// }
/// ```
pub trait Loss: Sync {
    fn loss<T: Scalar<Float = f64>>(
        &self,
        params: &ParamView<'_, T>,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> T;

    /// Stable identity folded into the inverse-cache key.
    ///
    /// Defaults to the type name. Losses carrying hyperparameters should
    /// include them, otherwise two differently configured instances share a
    /// cache.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Model evaluation `f(params, x) → outputs` for one input.
pub trait Model: Sync {
    fn forward<T: Scalar<Float = f64>>(&self, params: &ParamView<'_, T>, x: ArrayViewD<'_, f64>)
        -> Vec<T>;
}
