//! Core engine: the per-account sync → reconcile → decide → act loop.

pub mod account;
pub mod confirmation;
pub mod executor;
pub mod hedge;
