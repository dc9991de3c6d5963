use crate::BasaltResult;

/// Extension trait for [`BasaltResult`].
pub trait ResultExt<T>: private::Sealed {
    /// Flatten a nested [`BasaltResult`]. Helper until `Result::flatten` is
    /// stabilized.
    fn flatten_result(self) -> BasaltResult<T>;
}

mod private {
    use crate::BasaltResult;

    pub trait Sealed {}

    impl<T> Sealed for BasaltResult<BasaltResult<T>> {}
}

impl<T> ResultExt<T> for BasaltResult<BasaltResult<T>> {
    fn flatten_result(self) -> BasaltResult<T> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}
