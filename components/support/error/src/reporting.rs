/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use parking_lot::RwLock;
use std::sync::{Arc, Mutex};

/// Application error reporting trait.
///
/// The process embedding this crate can install one of these to forward
/// unexpected errors to whatever error-tracking system it uses; absent an
/// install, errors are simply logged via the `log` crate.
pub trait ApplicationErrorReporter: Sync + Send {
    /// Send an error report to a Sentry-like error reporting system.
    ///
    /// `type_name` should be used to group errors together.
    fn report_error(&self, type_name: String, message: String);
}

// ApplicationErrorReporter to use if the process doesn't set one.
struct DefaultApplicationErrorReporter;
impl ApplicationErrorReporter for DefaultApplicationErrorReporter {
    fn report_error(&self, _type_name: String, _message: String) {}
}

lazy_static::lazy_static! {
    // RwLock rather than a Mutex, since we only expect to set this once.
    pub(crate) static ref APPLICATION_ERROR_REPORTER: RwLock<Box<dyn ApplicationErrorReporter>> =
        RwLock::new(Box::new(DefaultApplicationErrorReporter));
}

pub fn set_application_error_reporter(reporter: Box<dyn ApplicationErrorReporter>) {
    *APPLICATION_ERROR_REPORTER.write() = reporter;
}

pub fn unset_application_error_reporter() {
    *APPLICATION_ERROR_REPORTER.write() = Box::new(DefaultApplicationErrorReporter)
}

/// Report an unexpected error: always logged at `error` level, then handed
/// to the installed `ApplicationErrorReporter`, if any.
pub fn report_error(type_name: String, message: String) {
    let breadcrumbs = crate::error_tracing::recent_breadcrumbs();
    log::error!(
        target: "error-support::error",
        "{} ({})\nbreadcrumbs:\n{}",
        message,
        type_name,
        breadcrumbs
    );
    APPLICATION_ERROR_REPORTER
        .read()
        .report_error(type_name, message);
}

/// Error reporter that captures reported errors, for tests asserting a
/// particular error was reported.
#[derive(Default)]
pub struct TestErrorReporter {
    errors: Mutex<Vec<(String, String)>>,
}

impl TestErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl ApplicationErrorReporter for TestErrorReporter {
    fn report_error(&self, type_name: String, message: String) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((type_name, message));
        }
    }
}

/// Adapter that implements `ApplicationErrorReporter` and delegates to an
/// `Arc<TestErrorReporter>` (`set_application_error_reporter` wants a
/// `Box`, so tests that need to keep their own handle go through this).
pub struct ArcReporterAdapter {
    inner: Arc<TestErrorReporter>,
}

impl ArcReporterAdapter {
    pub fn new(inner: Arc<TestErrorReporter>) -> Self {
        Self { inner }
    }
}

impl ApplicationErrorReporter for ArcReporterAdapter {
    fn report_error(&self, type_name: String, message: String) {
        self.inner.report_error(type_name, message)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_report_error_reaches_installed_reporter() {
        let reporter = Arc::new(TestErrorReporter::new());
        set_application_error_reporter(Box::new(ArcReporterAdapter::new(reporter.clone())));
        report_error("test-error".to_string(), "boom".to_string());
        assert_eq!(
            reporter.get_errors(),
            vec![("test-error".to_string(), "boom".to_string())]
        );
        unset_application_error_reporter();
    }
}
