//! # Display Coordinator
//!
//! The single consumer of the outbox. It owns the [`DisplayState`] and is the
//! only place that triggers redraws.
//!
//! ## Redraw Trigger
//!
//! Updates are applied one at a time. After each one the coordinator checks
//! the outbox: if it is empty this is a quiescent point and the board is
//! redrawn once; otherwise the redraw waits for the rest of the burst.
//!
//! Under a sustained stream of updates the redraw is postponed until the
//! stream pauses. There is no upper bound on that delay.

use crate::display::Display;
use crate::display_state::DisplayState;
use crate::outbox::Inbound;
use crate::Update;
use chrono::Utc;
use chrono_tz::Tz;

/// Drains the outbox into a [`DisplayState`] and redraws at quiescent points.
pub struct DisplayCoordinator<D> {
    inbound: Inbound,
    display: D,
    state: DisplayState,
    tz: Tz,
    redraws: u64,
}

impl<D: Display> DisplayCoordinator<D> {
    pub fn new(inbound: Inbound, display: D, tz: Tz) -> Self {
        DisplayCoordinator {
            inbound,
            display,
            state: DisplayState::new(),
            tz,
            redraws: 0,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    /// Number of redraws triggered so far.
    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    /// Process updates until every producer has dropped its outbox handle.
    ///
    /// Returns the final state.
    pub async fn run(mut self) -> DisplayState {
        log::info!("Display coordinator running");
        while let Some(update) = self.inbound.recv().await {
            self.handle(update);
        }
        log::info!(
            "Outbox closed after {} redraws, coordinator stopping",
            self.redraws
        );
        self.state
    }

    /// Apply one update and redraw if nothing else is waiting.
    ///
    /// Returns whether a redraw was triggered.
    pub fn handle(&mut self, update: Update) -> bool {
        log::debug!("Applying {} update", update.kind());
        let now = Utc::now().with_timezone(&self.tz);
        self.state.apply(update, now);

        if !self.inbound.is_empty() {
            return false;
        }
        self.redraw();
        true
    }

    fn redraw(&mut self) {
        log::info!("Draw new screen");
        self.redraws += 1;
        let image = self.display.render(&self.state);
        if let Err(e) = self.display.show(image) {
            log::error!("Redraw failed: {}", e);
        }
    }
}
