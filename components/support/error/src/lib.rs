/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Shared error plumbing: the `ErrorKind` + `Error` newtype idiom every
//! crate in this workspace follows, plus breadcrumb/error-reporting
//! helpers and a couple of small PII-redaction functions for logging.

mod error_tracing;
pub mod handling;
pub mod redact;
mod reporting;

pub use error_support_macros::handle_error;
pub use handling::{convert_log_report_error, ErrorHandling, ErrorReporting, GetErrorHandling};
pub use reporting::report_error;

/// Declare the public `Error`/`Result` pair for a crate from an internal
/// `ErrorKind` enum.
///
/// Given:
/// ```ignore
/// #[derive(Debug, thiserror::Error)]
/// pub enum ErrorKind {
///     #[error("sql error: {0}")]
///     Sql(#[from] rusqlite::Error),
///     #[error("not found")]
///     NotFound,
/// }
/// error_support::define_error! {
///     ErrorKind {
///         (Sql, rusqlite::Error),
///     }
/// }
/// ```
/// this generates a `pub struct Error(Box<ErrorKind>)` with a `.kind()`
/// accessor, a `pub type Result<T> = std::result::Result<T, Error>`, and a
/// `From<SourceType> for Error` impl for each listed variant so `?` works
/// directly against the wrapped source types without naming `ErrorKind` at
/// the call site.
#[macro_export]
macro_rules! define_error {
    ($kind:ident { $(($variant:ident, $type:ty)),* $(,)? }) => {
        #[derive(Debug)]
        pub struct Error(Box<$kind>);

        pub type Result<T, E = Error> = ::std::result::Result<T, E>;

        impl Error {
            /// Borrow the internal error kind, e.g. to match on it in tests.
            pub fn kind(&self) -> &$kind {
                &self.0
            }
        }

        impl ::std::fmt::Display for Error {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::std::error::Error for Error {
            fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
                ::std::error::Error::source(&*self.0)
            }
        }

        impl From<$kind> for Error {
            fn from(kind: $kind) -> Error {
                Error(Box::new(kind))
            }
        }

        $(
            impl From<$type> for Error {
                fn from(e: $type) -> Error {
                    Error::from($kind::$variant(e))
                }
            }
        )*
    };
}

/// Record a breadcrumb at the call site: `module!:line` plus a formatted
/// message, kept in the recent-breadcrumbs ring buffer and logged at
/// `trace` level.
#[macro_export]
macro_rules! breadcrumb {
    ($($arg:tt)*) => {
        $crate::report_breadcrumb(
            format!($($arg)*),
            module_path!().to_string(),
            line!(),
            column!(),
        )
    };
}

/// Report an unexpected error under `type_name` for grouping, including the
/// recent breadcrumb trail.
#[macro_export]
macro_rules! report_error {
    ($type_name:expr, $($arg:tt)*) => {
        $crate::report_error($type_name.to_string(), format!($($arg)*))
    };
}

pub use error_tracing::report_breadcrumb;
