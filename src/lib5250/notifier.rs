//! Screen change notification
//!
//! Listeners register once and receive [`ScreenEvent`]s synchronously on the
//! thread that applied the change. The listener list is copy-on-write: a
//! dispatch works on the snapshot taken when it started, so subscribing or
//! unsubscribing from inside a callback never deadlocks and only affects
//! later dispatches.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::lib5250::display::DirtyRect;
use crate::lib5250::oia::OiaSnapshot;

/// Change report handed to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenEvent {
    RegionChanged(DirtyRect),
    CursorMoved { row: usize, col: usize },
    SizeChanged { rows: usize, cols: usize },
    OiaChanged(OiaSnapshot),
}

pub trait ScreenListener: Send + Sync {
    fn on_event(&self, event: &ScreenEvent);
}

impl<F> ScreenListener for F
where
    F: Fn(&ScreenEvent) + Send + Sync,
{
    fn on_event(&self, event: &ScreenEvent) {
        self(event)
    }
}

/// Handle returned by [`ScreenChangeNotifier::subscribe`]
pub type ListenerId = u64;

type ListenerList = Vec<(ListenerId, Arc<dyn ScreenListener>)>;

#[derive(Default)]
pub struct ScreenChangeNotifier {
    listeners: RwLock<Arc<ListenerList>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ScreenChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenChangeNotifier")
            .field("listeners", &self.snapshot().len())
            .finish()
    }
}

impl ScreenChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<ListenerList> {
        Arc::clone(&self.listeners.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn subscribe(&self, listener: Arc<dyn ScreenListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let mut list = ListenerList::clone(&guard);
        list.push((id, listener));
        *guard = Arc::new(list);
        log::debug!("listener {id} subscribed ({} total)", guard.len());
        id
    }

    /// Remove a listener. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let list: ListenerList = guard.iter().filter(|(existing, _)| *existing != id).cloned().collect();
        *guard = Arc::new(list);
        true
    }

    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Deliver `event` to every listener registered when the call started.
    /// A panicking listener is logged and skipped.
    pub fn notify(&self, event: &ScreenEvent) {
        for (id, listener) in self.snapshot().iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if outcome.is_err() {
                log::warn!("screen listener {id} panicked handling {event:?}");
            }
        }
    }

    pub fn notify_region_changed(&self, rect: DirtyRect) {
        self.notify(&ScreenEvent::RegionChanged(rect));
    }

    pub fn notify_cursor_moved(&self, row: usize, col: usize) {
        self.notify(&ScreenEvent::CursorMoved { row, col });
    }

    pub fn notify_size_changed(&self, rows: usize, cols: usize) {
        self.notify(&ScreenEvent::SizeChanged { rows, cols });
    }

    pub fn notify_oia_changed(&self, snapshot: OiaSnapshot) {
        self.notify(&ScreenEvent::OiaChanged(snapshot));
    }

    pub fn dispatch_all(&self, events: &[ScreenEvent]) {
        for event in events {
            self.notify(event);
        }
    }
}
