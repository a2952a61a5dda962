//! Interrupt-vector dispatch for the simulated card.
//!
//! The firmware wires its two service routines to fixed hardware vectors
//! and stashes a singleton pointer so they can reach instance state. The
//! host-side equivalent: one card per process, owned by a static, with
//! free functions standing in for the vectors. An unbound vector is a
//! no-op, like a service routine finding a null singleton.

use std::sync::{Arc, RwLock};

use crate::sim::SimTransport;

static ACTIVE_CARD: RwLock<Option<Arc<SimTransport>>> = RwLock::new(None);

/// Installs `card` as the process-wide interrupt target.
pub fn bind(card: Arc<SimTransport>) {
    *ACTIVE_CARD.write().expect("vector registry poisoned") = Some(card);
}

/// Removes the installed card.
pub fn unbind() {
    *ACTIVE_CARD.write().expect("vector registry poisoned") = None;
}

/// Pin-change interrupt vector.
pub fn pin_change_vector() {
    if let Some(card) = ACTIVE_CARD
        .read()
        .expect("vector registry poisoned")
        .as_ref()
    {
        card.on_pin_change();
    }
}

/// Timer compare-match interrupt vector.
pub fn timer_compare_vector() {
    if let Some(card) = ACTIVE_CARD
        .read()
        .expect("vector registry poisoned")
        .as_ref()
    {
        card.on_timer_match();
    }
}
