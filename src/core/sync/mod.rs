/*!
 * Synchronization Primitives
 * Poll pacing shared by the exit watchers
 */

mod backoff;

pub use backoff::Backoff;
