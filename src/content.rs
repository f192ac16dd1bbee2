//! Live mirror of the editable site content.
//!
//! [`ContentStore`] keeps a local copy of `content/eventDetails` and
//! `content/coaches`, refreshed by a single push subscription, and is the
//! only write path back to the remote document. Every mutation checks the
//! caller's [`Session::is_admin`] before doing anything else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::Session;
use crate::models::{
    Coach, ContentDocument, ContentView, EventDetails, EventDetailsDraft, EventDetailsPatch,
    EventDetailsUpdate, Notification, default_coaches,
};
use crate::settings::Settings;
use crate::store::{
    COACHES_PATH, CONTENT_ROOT, DocumentStore, EVENT_DETAILS_PATH, SnapshotEvent,
    SnapshotHandler, StoreError, Subscription, coach_path,
};
use crate::upload::{AssetUploader, ImageFile, UploadError};
use crate::validation::{ImageValidationError, validate_image};

pub const COACH_IMAGE_FOLDER: &str = "coaches";

const PERMISSION_DENIED: &str = "You don't have permission to update content.";
const LOAD_FAILED: &str = "Failed to load content. Please refresh the page.";
const INIT_FAILED: &str = "Failed to initialize content.";
const EVENT_SAVE_FAILED: &str = "Failed to update event details.";
const COACHES_SAVE_FAILED: &str = "Failed to update coaches.";
const COACH_SAVE_FAILED: &str = "Failed to update coach.";
const UPLOAD_FAILED: &str = "Failed to upload image.";

const EVENT_SAVED: &str = "Event details updated successfully!";
const COACHES_SAVED: &str = "Coaches updated successfully!";
const COACH_SAVED: &str = "Coach updated successfully!";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("You don't have permission to update content.")]
    Unauthorized,
    #[error("No image file was provided")]
    MissingFile,
    #[error("Coach {0} does not exist")]
    CoachNotFound(usize),
    #[error(transparent)]
    InvalidImage(#[from] ImageValidationError),
    #[error("Failed to upload image: {0}")]
    Upload(#[from] UploadError),
    #[error("Failed to {context}: {source}")]
    Remote {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentOptions {
    pub toast_window: Duration,
    pub error_window: Duration,
    pub max_image_bytes: usize,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            toast_window: Duration::from_secs(3),
            error_window: Duration::from_secs(5),
            max_image_bytes: 2 * 1024 * 1024,
        }
    }
}

impl From<&Settings> for ContentOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            toast_window: settings.toast_window(),
            error_window: settings.error_window(),
            max_image_bytes: settings.max_image_bytes,
        }
    }
}

#[derive(Debug)]
struct ContentState {
    event_details: EventDetails,
    draft: EventDetailsDraft,
    is_editing: bool,
    /// Slot `i` mirrors `content/coaches/{i}`; `None` is a hole in a sparse roster.
    coaches: Vec<Option<Arc<Coach>>>,
    is_editing_coaches: bool,
    loading: bool,
    error: Option<String>,
    error_generation: u64,
    toast: Notification,
    toast_generation: u64,
}

impl Default for ContentState {
    fn default() -> Self {
        Self {
            event_details: EventDetails::default(),
            draft: EventDetailsDraft::default(),
            is_editing: false,
            coaches: default_coaches().into_iter().map(Some).collect(),
            is_editing_coaches: false,
            loading: true,
            error: None,
            error_generation: 0,
            toast: Notification::default(),
            toast_generation: 0,
        }
    }
}

impl ContentState {
    /// Reconciles local state with a snapshot of `content`.
    fn apply_snapshot(&mut self, value: &Value) {
        if let Some(details) = value.get("eventDetails") {
            match serde_json::from_value::<EventDetailsPatch>(details.clone()) {
                Ok(patch) => self.event_details.merge(&patch),
                Err(err) => warn!(error = %err, "ignoring malformed eventDetails snapshot"),
            }
        }
        self.is_editing = false;

        if let Some(roster) = value.get("coaches").and_then(parse_roster) {
            self.coaches = reconcile_roster(&self.coaches, roster);
        }
    }

    fn bootstrap_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(ContentDocument {
            event_details: &self.event_details,
            coaches: self.coaches.iter().map(|slot| slot.as_deref()).collect(),
        })
    }
}

/// Accepts a dense array or an index-keyed object (how sparse arrays come
/// back). Holes and malformed entries keep their slot so positions stay
/// aligned with the remote indices.
fn parse_roster(value: &Value) -> Option<Vec<Option<Coach>>> {
    let slots: Vec<Option<&Value>> = match value {
        Value::Array(items) => items.iter().map(Some).collect(),
        Value::Object(map) => {
            let indexed: Vec<(usize, &Value)> = map
                .iter()
                .filter_map(|(key, v)| key.parse::<usize>().ok().map(|i| (i, v)))
                .collect();
            let len = indexed.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
            let mut slots = vec![None; len];
            for (i, v) in indexed {
                slots[i] = Some(v);
            }
            slots
        }
        other => {
            warn!(kind = ?other, "ignoring coaches snapshot that is not a list");
            return None;
        }
    };

    let mut roster: Vec<Option<Coach>> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            let v = slot.filter(|v| !v.is_null())?;
            serde_json::from_value::<Coach>(v.clone())
                .map_err(|err| warn!(index, error = %err, "treating malformed coach entry as empty"))
                .ok()
        })
        .collect();
    while matches!(roster.last(), Some(None)) {
        roster.pop();
    }
    Some(roster)
}

/// Replaces the roster wholesale while reusing the allocation of every entry
/// whose content did not change.
fn reconcile_roster(
    current: &[Option<Arc<Coach>>],
    incoming: Vec<Option<Coach>>,
) -> Vec<Option<Arc<Coach>>> {
    incoming
        .into_iter()
        .enumerate()
        .map(|(i, coach)| {
            let coach = coach?;
            match current.get(i) {
                Some(Some(existing)) if **existing == coach => Some(existing.clone()),
                _ => Some(Arc::new(coach)),
            }
        })
        .collect()
}

struct Shared {
    state: Mutex<ContentState>,
    options: ContentOptions,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ContentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn raise_error(self: &Arc<Self>, message: &str) {
        let generation = {
            let mut state = self.lock();
            state.error = Some(message.to_string());
            state.error_generation += 1;
            state.error_generation
        };
        self.expire(self.options.error_window, move |state| {
            if state.error_generation == generation {
                state.error = None;
            }
        });
    }

    /// Replaces whatever toast is showing.
    fn raise_toast(self: &Arc<Self>, message: &str) {
        let generation = {
            let mut state = self.lock();
            state.toast = Notification {
                visible: true,
                message: message.to_string(),
            };
            state.toast_generation += 1;
            state.toast_generation
        };
        self.expire(self.options.toast_window, move |state| {
            if state.toast_generation == generation {
                state.toast = Notification::default();
            }
        });
    }

    fn expire(
        self: &Arc<Self>,
        after: Duration,
        clear: impl FnOnce(&mut ContentState) + Send + 'static,
    ) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime available, notification will not auto-clear");
            return;
        };
        let shared = Arc::downgrade(self);
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(shared) = shared.upgrade() {
                clear(&mut *shared.lock());
            }
        });
    }
}

/// The content layer shared by every view of the site.
pub struct ContentStore {
    documents: Arc<dyn DocumentStore>,
    uploader: Arc<dyn AssetUploader>,
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
}

impl ContentStore {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        uploader: Arc<dyn AssetUploader>,
        options: ContentOptions,
    ) -> Self {
        Self {
            documents,
            uploader,
            shared: Arc::new(Shared {
                state: Mutex::new(ContentState::default()),
                options,
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Attaches the push subscription to `content`. Calling it again while a
    /// subscription is live does nothing.
    ///
    /// When the remote document does not exist yet and `session` is
    /// privileged, the current defaults are written once; loading settles
    /// when that write echoes back.
    pub fn activate(&self, session: &Session) -> Result<(), ContentError> {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        let handler = self.snapshot_handler(session.is_admin);
        match self.documents.subscribe(CONTENT_ROOT, handler) {
            Ok(subscription) => {
                info!(privileged = session.is_admin, "content subscription attached");
                *slot = Some(subscription);
                Ok(())
            }
            Err(source) => {
                error!(error = %source, "failed to subscribe to content");
                self.shared.raise_error(LOAD_FAILED);
                self.shared.lock().loading = false;
                Err(ContentError::Remote {
                    context: "subscribe to content",
                    source,
                })
            }
        }
    }

    /// Releases the subscription. Dropping the store does the same.
    pub fn deactivate(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            info!("content subscription released");
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn snapshot_handler(&self, privileged: bool) -> SnapshotHandler {
        let shared = self.shared.clone();
        let documents: Weak<dyn DocumentStore> = Arc::downgrade(&self.documents);
        let bootstrap_started = AtomicBool::new(false);

        Arc::new(move |event: SnapshotEvent| match event {
            SnapshotEvent::Value(Some(value)) => {
                let mut state = shared.lock();
                state.apply_snapshot(&value);
                state.loading = false;
                debug!("applied content snapshot");
            }
            SnapshotEvent::Value(None) if privileged => {
                if bootstrap_started.swap(true, Ordering::SeqCst) {
                    return;
                }
                bootstrap(&shared, &documents);
            }
            SnapshotEvent::Value(None) => {
                debug!("no remote content yet, keeping defaults");
                shared.lock().loading = false;
            }
            SnapshotEvent::Error(message) => {
                error!(%message, "content subscription failed");
                shared.raise_error(LOAD_FAILED);
                shared.lock().loading = false;
            }
        })
    }

    /// Applies `update` locally and, only when it explicitly closes editing,
    /// merge-writes the resulting persisted record to `content/eventDetails`.
    pub async fn update_event_details(
        &self,
        session: &Session,
        update: EventDetailsUpdate,
    ) -> Result<(), ContentError> {
        self.authorize(session, "update_event_details")?;

        let persist = update.closes_editing();
        let fields = {
            let mut state = self.shared.lock();
            state.event_details.merge(&update.fields);
            if let Some(draft) = &update.draft {
                state.draft.absorb(draft);
            }
            if let Some(is_editing) = update.is_editing {
                state.is_editing = is_editing;
            }
            if !persist {
                return Ok(());
            }
            state.draft = EventDetailsDraft::default();
            state.event_details.to_patch().to_fields()
        };

        match self.documents.update(EVENT_DETAILS_PATH, fields).await {
            Ok(()) => {
                info!(user = ?session.user_id(), "event details saved");
                self.shared.raise_toast(EVENT_SAVED);
                Ok(())
            }
            Err(source) => {
                error!(error = %source, "failed to save event details");
                self.shared.raise_error(EVENT_SAVE_FAILED);
                Err(ContentError::Remote {
                    context: "update event details",
                    source,
                })
            }
        }
    }

    /// Returns whether the toggle happened.
    pub fn toggle_event_edit_mode(&self, session: &Session) -> bool {
        if !session.is_admin {
            return false;
        }
        let mut state = self.shared.lock();
        state.is_editing = !state.is_editing;
        true
    }

    /// Returns whether the toggle happened.
    pub fn toggle_coaches_edit_mode(&self, session: &Session) -> bool {
        if !session.is_admin {
            return false;
        }
        let mut state = self.shared.lock();
        state.is_editing_coaches = !state.is_editing_coaches;
        true
    }

    /// Replaces the whole roster, locally and remotely. A failed write leaves
    /// the local roster as submitted.
    pub async fn update_coaches(
        &self,
        session: &Session,
        roster: Vec<Coach>,
    ) -> Result<(), ContentError> {
        self.authorize(session, "update_coaches")?;

        let value = serde_json::to_value(&roster).map_err(|err| ContentError::Remote {
            context: "encode coaches",
            source: err.into(),
        })?;
        {
            let mut state = self.shared.lock();
            let roster = roster.into_iter().map(Some).collect();
            state.coaches = reconcile_roster(&state.coaches, roster);
            state.is_editing_coaches = false;
        }

        self.write_set(COACHES_PATH.to_string(), value, COACHES_SAVED, COACHES_SAVE_FAILED)
            .await
    }

    /// Replaces the coach at `index`. An index past the end grows the roster,
    /// leaving holes in between, the same way the remote array does.
    pub async fn update_coach(
        &self,
        session: &Session,
        index: usize,
        coach: Coach,
    ) -> Result<(), ContentError> {
        self.authorize(session, "update_coach")?;

        let value = serde_json::to_value(&coach).map_err(|err| ContentError::Remote {
            context: "encode coach",
            source: err.into(),
        })?;
        {
            let mut state = self.shared.lock();
            if index >= state.coaches.len() {
                if index > state.coaches.len() {
                    debug!(index, len = state.coaches.len(), "coach index leaves holes in roster");
                }
                state.coaches.resize(index + 1, None);
            }
            state.coaches[index] = Some(Arc::new(coach));
        }

        self.write_set(coach_path(index), value, COACH_SAVED, COACH_SAVE_FAILED)
            .await
    }

    /// Validates and uploads `file`, then stores its URL as the image of the
    /// coach at `index`.
    pub async fn upload_coach_image(
        &self,
        session: &Session,
        index: usize,
        file: Option<ImageFile>,
    ) -> Result<Url, ContentError> {
        self.authorize(session, "upload_coach_image")?;
        let file = file.ok_or(ContentError::MissingFile)?;
        validate_image(&file, self.shared.options.max_image_bytes)?;

        let current = {
            let state = self.shared.lock();
            state.coaches.get(index).cloned().flatten()
        }
        .ok_or(ContentError::CoachNotFound(index))?;

        let url = match self.uploader.upload(&file, COACH_IMAGE_FOLDER).await {
            Ok(url) => url,
            Err(err) => {
                error!(error = %err, index, "coach image upload failed");
                self.shared.raise_error(UPLOAD_FAILED);
                return Err(err.into());
            }
        };

        let mut coach = Coach::clone(&current);
        coach.image = Some(url.clone());
        if let Err(err) = self.update_coach(session, index, coach).await {
            self.shared.raise_error(UPLOAD_FAILED);
            return Err(err);
        }
        Ok(url)
    }

    pub fn hide_toast(&self) {
        self.shared.lock().toast = Notification::default();
    }

    pub fn view(&self, session: &Session) -> ContentView {
        let state = self.shared.lock();
        ContentView {
            event_details: state.event_details.clone(),
            is_editing: state.is_editing,
            draft: state.draft.clone(),
            coaches: state
                .coaches
                .iter()
                .map(|slot| slot.as_deref().cloned())
                .collect(),
            is_editing_coaches: state.is_editing_coaches,
            loading: state.loading,
            error: state.error.clone(),
            show_toast: state.toast.visible,
            toast_message: state.toast.message.clone(),
            can_edit: session.is_admin,
        }
    }

    pub fn event_details(&self) -> EventDetails {
        self.shared.lock().event_details.clone()
    }

    pub fn draft(&self) -> EventDetailsDraft {
        self.shared.lock().draft.clone()
    }

    /// Index-aligned with `content/coaches`.
    pub fn roster(&self) -> Vec<Option<Arc<Coach>>> {
        self.shared.lock().coaches.clone()
    }

    pub fn coach(&self, index: usize) -> Option<Arc<Coach>> {
        self.shared.lock().coaches.get(index).cloned().flatten()
    }

    pub fn is_editing(&self) -> bool {
        self.shared.lock().is_editing
    }

    pub fn is_editing_coaches(&self) -> bool {
        self.shared.lock().is_editing_coaches
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    pub fn toast(&self) -> Notification {
        self.shared.lock().toast.clone()
    }

    fn authorize(&self, session: &Session, operation: &'static str) -> Result<(), ContentError> {
        if session.is_admin {
            return Ok(());
        }
        warn!(operation, user = ?session.user_id(), "content mutation denied");
        self.shared.raise_error(PERMISSION_DENIED);
        Err(ContentError::Unauthorized)
    }

    async fn write_set(
        &self,
        path: String,
        value: Value,
        saved: &str,
        failed: &str,
    ) -> Result<(), ContentError> {
        match self.documents.set(&path, value).await {
            Ok(()) => {
                info!(%path, "content saved");
                self.shared.raise_toast(saved);
                Ok(())
            }
            Err(source) => {
                error!(%path, error = %source, "failed to save content");
                self.shared.raise_error(failed);
                Err(ContentError::Remote {
                    context: "save content",
                    source,
                })
            }
        }
    }
}

fn bootstrap(shared: &Arc<Shared>, documents: &Weak<dyn DocumentStore>) {
    let Some(documents) = documents.upgrade() else {
        return;
    };
    let encoded = shared.lock().bootstrap_document();
    let document = match encoded {
        Ok(document) => document,
        Err(err) => {
            error!(error = %err, "failed to encode default content");
            shared.lock().loading = false;
            return;
        }
    };
    let Ok(runtime) = Handle::try_current() else {
        warn!("no runtime available, skipping content bootstrap");
        shared.lock().loading = false;
        return;
    };

    info!("remote content missing, writing defaults");
    let shared = shared.clone();
    runtime.spawn(async move {
        if let Err(err) = documents.set(CONTENT_ROOT, document).await {
            error!(error = %err, "failed to initialize content");
            shared.raise_error(INIT_FAILED);
            shared.lock().loading = false;
        }
    });
}
