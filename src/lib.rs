//! chainmirror - explorer feed mirror with derived per-block metrics
//!
//! Library surface for the synchronizer; see [`sync`] for the component
//! breakdown. Binaries: `chainmirror` (poller daemon) and `repair`
//! (operator backfill / average recomputation).

pub mod sync;
