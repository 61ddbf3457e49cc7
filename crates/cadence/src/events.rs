//! Event hook boundary.
//!
//! The core does not process input. A scene registers callbacks against
//! string event keys once, before the tick loop starts, and the application
//! driver emits keys whenever its windowing or input backend sees something
//! interesting. Handlers get an [`EventContext`] with the active scene and
//! the app control flags (exit, pause).

use std::collections::HashMap;

use crate::scene::Scene;

/// Control flags shared between the driver and event handlers.
#[derive(Default)]
pub(crate) struct Control {
    pub(crate) exit: bool,
    pub(crate) paused: bool,
}

/// What an event handler can reach: the active scene and app control.
pub struct EventContext<'a> {
    /// The active scene, if one is installed.
    pub scene: Option<&'a mut Scene>,
    pub(crate) control: &'a mut Control,
}

impl EventContext<'_> {
    /// Ask the driver to stop its run loop after the current frame.
    pub fn request_exit(&mut self) {
        self.control.exit = true;
    }

    /// Flip the pause flag. Takes effect on the next tick.
    pub fn toggle_pause(&mut self) {
        self.control.paused = !self.control.paused;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.control.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused
    }
}

type Handler = Box<dyn FnMut(&mut EventContext<'_>)>;

/// Registered scene-level callbacks, keyed by event name.
#[derive(Default)]
pub struct EventHub {
    handlers: HashMap<String, Vec<Handler>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event key. Multiple callbacks per key run
    /// in registration order.
    pub fn on(&mut self, key: impl Into<String>, handler: impl FnMut(&mut EventContext<'_>) + 'static) {
        self.handlers.entry(key.into()).or_default().push(Box::new(handler));
    }

    /// Run every handler registered for `key`. Returns how many ran.
    pub(crate) fn emit(&mut self, key: &str, cx: &mut EventContext<'_>) -> usize {
        match self.handlers.get_mut(key) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(cx);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    /// Number of handlers registered for `key`.
    pub fn handler_count(&self, key: &str) -> usize {
        self.handlers.get(key).map_or(0, Vec::len)
    }

    /// Drop all registered handlers (used when switching scenes).
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn handlers_run_in_registration_order() {
        let mut hub = EventHub::new();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        for label in ["first", "second"] {
            let log = Rc::clone(&log);
            hub.on("key:space", move |_| log.borrow_mut().push(label));
        }

        let mut control = Control::default();
        let mut cx = EventContext {
            scene: None,
            control: &mut control,
        };
        assert_eq!(hub.emit("key:space", &mut cx), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn unknown_key_runs_nothing() {
        let mut hub = EventHub::new();
        let mut control = Control::default();
        let mut cx = EventContext {
            scene: None,
            control: &mut control,
        };
        assert_eq!(hub.emit("key:escape", &mut cx), 0);
    }

    #[test]
    fn context_controls_exit_and_pause() {
        let mut hub = EventHub::new();
        let ran = Rc::new(Cell::new(false));
        {
            let ran = Rc::clone(&ran);
            hub.on("key:escape", move |cx| {
                cx.request_exit();
                cx.toggle_pause();
                ran.set(true);
            });
        }

        let mut control = Control::default();
        let mut cx = EventContext {
            scene: None,
            control: &mut control,
        };
        hub.emit("key:escape", &mut cx);
        assert!(ran.get());
        assert!(control.exit);
        assert!(control.paused);
    }
}
