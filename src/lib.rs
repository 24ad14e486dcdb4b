//! Safe memory reclamation for lock-free data structures using DEBRA+
//! (Distributed Epoch-Based Reclamation with Neutralization).
//!
//! A user thread [`handle::Handle::register`]s once, then repeatedly [`guard::UnpinnedGuard::pin`]s
//! around a critical section, optionally [`guard::PinnedGuard::retire_ready`]ing objects it
//! unlinked, and [`guard::PinnedGuard::unpin`]s. Periodically (or from a dedicated thread)
//! [`manager::Manager::reclaim_start`] walks every thread's retired-object queue and frees
//! what is provably no longer reachable; [`manager::Manager::neutralize_stalled`] is the
//! escape valve for a thread that stays pinned too long.

pub mod config;
pub mod error;
pub mod guard;
pub mod handle;
pub mod limbo;
pub mod manager;
mod neutralize;
pub mod reclaim;
mod signal;
mod slot;
mod util;

pub use config::Config;
pub use error::RegistrationFull;
pub use handle::Handle;
pub use manager::{set_process_manager, Manager};
pub use signal::install_signal_handler;
