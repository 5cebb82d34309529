/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Orchestrates the push and delta pipelines (`spec.md` §4.6, component
//! C6) over a single `engram-store::Store`, resolving `DomainPlugin`s
//! through an `engram-registry::Registry`. This crate owns no database
//! schema of its own and starts no background threads -- compaction and
//! idempotency sweeps (`spec.md` §5) are the embedding process's job,
//! driven through `engram_store::compaction` and `engram_store::idempotency`
//! directly.

pub mod delta;
pub mod error;
pub mod push;
pub mod store_id;

pub use delta::delta;
pub use error::{EngineError, Result};
pub use push::{push, PushResult};
