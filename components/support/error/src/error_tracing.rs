/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use parking_lot::Mutex;

static RECENT_BREADCRUMBS: Mutex<BreadcrumbRingBuffer> = Mutex::new(BreadcrumbRingBuffer::new());

/// Record a breadcrumb: push it onto the recent-breadcrumbs ring buffer and
/// log it at `trace` level. `report_error` attaches the current buffer
/// contents to the next reported error, so a crash report's last N
/// breadcrumbs show the path that led to it.
pub fn report_breadcrumb(message: String, module: String, line: u32, column: u32) {
    RECENT_BREADCRUMBS.lock().push(message.clone());
    log::trace!(target: "error-support::breadcrumb", "{} ({}:{}:{})", message, module, line, column);
}

pub(crate) fn recent_breadcrumbs() -> String {
    RECENT_BREADCRUMBS.lock().get_breadcrumbs().join("\n")
}

/// Ring buffer implementation that we use to store the most recent 20 breadcrumbs
#[derive(Default)]
struct BreadcrumbRingBuffer {
    breadcrumbs: Vec<String>,
    pos: usize,
}

impl BreadcrumbRingBuffer {
    const MAX_ITEMS: usize = 20;

    const fn new() -> Self {
        Self {
            breadcrumbs: Vec::new(),
            pos: 0,
        }
    }

    fn push(&mut self, breadcrumb: impl Into<String>) {
        let breadcrumb = breadcrumb.into();
        if self.breadcrumbs.len() < Self::MAX_ITEMS {
            self.breadcrumbs.push(breadcrumb);
        } else {
            self.breadcrumbs[self.pos] = breadcrumb;
            self.pos = (self.pos + 1) % Self::MAX_ITEMS;
        }
    }

    fn get_breadcrumbs(&self) -> Vec<String> {
        let mut breadcrumbs = Vec::from(&self.breadcrumbs[self.pos..]);
        breadcrumbs.extend(self.breadcrumbs[..self.pos].iter().map(|s| s.to_string()));
        breadcrumbs
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_buffer() {
        let mut buf = BreadcrumbRingBuffer::default();
        for i in 0..10 {
            buf.push(format!("{:02}", i));
        }
        assert_eq!(
            buf.get_breadcrumbs(),
            (0..10).map(|i| format!("{:02}", i)).collect::<Vec<_>>()
        );

        for i in 10..20 {
            buf.push(format!("{:02}", i));
        }
        assert_eq!(
            buf.get_breadcrumbs(),
            (0..20).map(|i| format!("{:02}", i)).collect::<Vec<_>>()
        );

        buf.push("20");
        assert_eq!(
            buf.get_breadcrumbs(),
            (1..21).map(|i| format!("{:02}", i)).collect::<Vec<_>>()
        );

        for i in 21..26 {
            buf.push(format!("{:02}", i));
        }
        assert_eq!(
            buf.get_breadcrumbs(),
            (6..26).map(|i| format!("{:02}", i)).collect::<Vec<_>>()
        );
    }
}
