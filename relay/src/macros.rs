//! Utility macros for error construction.

/// Creates a [`crate::error::RelayError`] from an error kind and description.
///
/// # Examples
/// ```rust,no_run
/// use relay::error::{ErrorKind, RelayError};
/// use relay::relay_error;
///
/// let error = relay_error!(ErrorKind::ConfigError, "Unusable configuration");
/// let error = relay_error!(
///     ErrorKind::InvariantViolation,
///     "Partition out of range",
///     format!("partition={} partitions={}", 7, 4)
/// );
/// ```
#[macro_export]
macro_rules! relay_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::RelayError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::RelayError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::RelayError`] from the current function.
///
/// # Examples
/// ```rust,no_run
/// use relay::bail;
/// use relay::error::{ErrorKind, RelayResult};
///
/// fn check(partition: u32, partitions: u32) -> RelayResult<()> {
///     if partition >= partitions {
///         bail!(ErrorKind::InvariantViolation, "Partition out of range");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::relay_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::relay_error!($kind, $desc, $detail))
    };
}
