//! The blocking overlay as seen by the monitor: `show` and `hide`, nothing else.

use std::sync::Arc;

use crate::platform::OverlaySurface;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub struct Enforcer {
    surface: Arc<dyn OverlaySurface>,
    visible: bool,
}

impl Enforcer {
    pub fn new(surface: Arc<dyn OverlaySurface>) -> Self {
        Self {
            surface,
            visible: false,
        }
    }

    pub fn can_draw(&self) -> bool {
        self.surface.can_draw_overlays()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// No-op when the overlay grant is gone; the monitor notices the missing
    /// capability on its own tick.
    pub fn show(&mut self) {
        if !self.surface.can_draw_overlays() {
            log_warn!("Overlay permission missing; cannot raise block screen");
            return;
        }
        self.surface.show();
        if !self.visible {
            log_info!("Block screen raised");
            self.visible = true;
        }
    }

    pub fn hide(&mut self) {
        self.surface.hide();
        if self.visible {
            log_info!("Block screen cleared");
            self.visible = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingSurface {
        denied: AtomicBool,
        shows: AtomicUsize,
        hides: AtomicUsize,
    }

    impl OverlaySurface for CountingSurface {
        fn can_draw_overlays(&self) -> bool {
            !self.denied.load(Ordering::SeqCst)
        }

        fn show(&self) {
            self.shows.fetch_add(1, Ordering::SeqCst);
        }

        fn hide(&self) {
            self.hides.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn show_is_skipped_without_permission() {
        let surface = Arc::new(CountingSurface::default());
        surface.denied.store(true, Ordering::SeqCst);
        let mut enforcer = Enforcer::new(surface.clone());

        enforcer.show();
        assert!(!enforcer.is_visible());
        assert_eq!(surface.shows.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tracks_visibility() {
        let surface = Arc::new(CountingSurface::default());
        let mut enforcer = Enforcer::new(surface.clone());

        enforcer.show();
        enforcer.show();
        assert!(enforcer.is_visible());
        enforcer.hide();
        assert!(!enforcer.is_visible());
        assert_eq!(surface.shows.load(Ordering::SeqCst), 2);
        assert_eq!(surface.hides.load(Ordering::SeqCst), 1);
    }
}
