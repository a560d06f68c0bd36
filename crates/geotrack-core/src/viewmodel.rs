//! Presentation state for the location screen.
//!
//! [`LocationViewModel`] owns a single [`UiState`] snapshot and publishes
//! every new snapshot on a `watch` channel. Renderers subscribe with
//! [`LocationViewModel::subscribe`] and redraw on change; user actions come
//! back in as [`UiIntent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use geotrack_types::{LocationRecord, millis_to_datetime};

use crate::dispatcher::WorkId;
use crate::usecase::{ObserveLocationsUseCase, RequestLocationUpdateUseCase};

/// A map-ready coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// One row of the location list as the UI shows it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationUiModel {
    pub id: i64,
    pub position: MapPosition,
    /// Capture time in milliseconds since Unix epoch.
    pub timestamp: i64,
}

impl LocationUiModel {
    /// Capture time as a date, when representable.
    pub fn captured_at(&self) -> Option<OffsetDateTime> {
        millis_to_datetime(self.timestamp)
    }
}

impl From<&LocationRecord> for LocationUiModel {
    fn from(record: &LocationRecord) -> Self {
        Self {
            id: record.id,
            position: MapPosition {
                latitude: record.latitude,
                longitude: record.longitude,
            },
            timestamp: record.timestamp,
        }
    }
}

/// Immutable snapshot of everything the location screen renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiState {
    /// Stored locations, newest first.
    pub locations: Vec<LocationUiModel>,
    /// A refresh request is in flight.
    pub is_loading: bool,
    /// Dismissible error message.
    pub error: Option<String>,
    /// Location the map should move to, until the renderer consumes it.
    pub selected_location_id: Option<i64>,
    /// Whether the history list is open.
    pub is_history_sheet_visible: bool,
}

impl UiState {
    /// The selected row, if it is still in the list.
    pub fn selected_location(&self) -> Option<&LocationUiModel> {
        let id = self.selected_location_id?;
        self.locations.iter().find(|l| l.id == id)
    }

    /// The most recent location.
    pub fn latest(&self) -> Option<&LocationUiModel> {
        self.locations.first()
    }
}

/// User actions the view model understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiIntent {
    Refresh,
    ClearError,
    ToggleHistorySheet,
    HideHistorySheet,
    SelectLocation(i64),
    ClearSelection,
}

/// Reduces intents and use-case results into [`UiState`] snapshots.
///
/// Dropping the view model (or calling [`close`](Self::close)) stops the
/// observation task. Already queued location updates keep running.
pub struct LocationViewModel {
    state: Arc<watch::Sender<UiState>>,
    observe: ObserveLocationsUseCase,
    request: RequestLocationUpdateUseCase,
    observation: Option<JoinHandle<()>>,
    // Only touched inside `send_modify`, which serializes updates
    refreshes_in_flight: AtomicUsize,
}

impl std::fmt::Debug for LocationViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationViewModel")
            .field("state", &*self.state.borrow())
            .field("observing", &self.is_observing())
            .finish()
    }
}

impl LocationViewModel {
    /// Create a view model with an empty state. Call [`start`](Self::start)
    /// to begin observing.
    pub fn new(observe: ObserveLocationsUseCase, request: RequestLocationUpdateUseCase) -> Self {
        let (state, _) = watch::channel(UiState::default());
        Self {
            state: Arc::new(state),
            observe,
            request,
            observation: None,
            refreshes_in_flight: AtomicUsize::new(0),
        }
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.subscribe()
    }

    /// The current snapshot.
    pub fn state(&self) -> UiState {
        self.state.borrow().clone()
    }

    /// Whether the observation task is running.
    pub fn is_observing(&self) -> bool {
        self.observation.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start observing stored locations.
    ///
    /// Every emission replaces the list and clears the error. A failing
    /// stream sets the error and ends the observation; it is not restarted.
    /// Calling `start` again replaces any running observation.
    pub async fn start(&mut self) {
        self.close();

        let mut stream = self.observe.execute().await;
        let state = Arc::clone(&self.state);

        self.observation = Some(tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(records) => {
                        debug!("Location list updated ({} rows)", records.len());
                        state.send_modify(|s| {
                            s.locations = records.iter().map(LocationUiModel::from).collect();
                            s.error = None;
                        });
                    }
                    Err(e) => {
                        warn!("Location observation failed: {}", e);
                        state.send_modify(|s| s.error = Some(e.to_string()));
                        break;
                    }
                }
            }
        }));
    }

    /// Stop observing. Queued work is unaffected.
    pub fn close(&mut self) {
        if let Some(task) = self.observation.take() {
            task.abort();
        }
    }

    /// Apply an intent.
    pub async fn dispatch(&self, intent: UiIntent) {
        match intent {
            UiIntent::Refresh => {
                self.request_refresh().await;
            }
            UiIntent::ClearError => self.clear_error(),
            UiIntent::ToggleHistorySheet => self.toggle_history_sheet(),
            UiIntent::HideHistorySheet => self.hide_history_sheet(),
            UiIntent::SelectLocation(id) => self.select_location(id),
            UiIntent::ClearSelection => self.clear_selection(),
        }
    }

    /// Queue a location update.
    ///
    /// Loading is on while any request is being queued; the new point
    /// arrives later through the observation. On failure the error message
    /// is shown and `None` is returned.
    pub async fn request_refresh(&self) -> Option<WorkId> {
        self.state.send_modify(|s| {
            self.refreshes_in_flight.fetch_add(1, Ordering::SeqCst);
            s.is_loading = true;
            s.error = None;
        });

        let result = self.request.execute().await;

        self.state.send_modify(|s| {
            let remaining = self.refreshes_in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            s.is_loading = remaining > 0;
            if let Err(e) = &result {
                s.error = Some(e.to_string());
            }
        });

        match result {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Refresh request failed: {}", e);
                None
            }
        }
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    pub fn toggle_history_sheet(&self) {
        self.state
            .send_modify(|s| s.is_history_sheet_visible = !s.is_history_sheet_visible);
    }

    pub fn hide_history_sheet(&self) {
        self.state.send_modify(|s| s.is_history_sheet_visible = false);
    }

    /// Select a location and close the history sheet.
    pub fn select_location(&self, id: i64) {
        self.state.send_modify(|s| {
            s.selected_location_id = Some(id);
            s.is_history_sheet_visible = false;
        });
    }

    /// Forget the selection once the renderer has moved to it.
    pub fn clear_selection(&self) {
        self.state.send_modify(|s| s.selected_location_id = None);
    }
}

impl Drop for LocationViewModel {
    fn drop(&mut self) {
        self.close();
    }
}
