/// Upload flow controller
///
/// The single screen's state machine. All user actions and asynchronous
/// results go through `UploadFlow::apply`, which mutates state and returns the
/// side effect the UI layer has to carry out.
use tracing::{debug, info, warn};

use super::data::SelectedImage;
use super::registry::ImageRegistry;
use crate::picker::PickOutcome;
use crate::upload::UploadEvent;

/// Alert shown when an upload fails, whatever the cause
pub const UPLOAD_FAILED_MESSAGE: &str = "Sorry, Try again.";

/// Alert shown when an uploaded image could not be recorded locally
pub const SAVE_FAILED_MESSAGE: &str = "Your image was uploaded but could not be saved to the list.";

/// Coarse screen phase, derived from `selected` and `uploading`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Selected,
    Uploading,
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// User pressed "Pick image"
    Pick,
    /// The picker dialog returned
    Picked(PickOutcome),
    /// User pressed "Upload image"
    Upload,
    /// The running upload emitted an event
    Transfer(UploadEvent),
    /// The gallery cell at this position failed to display
    RemoveAt(usize),
}

/// What the UI layer must do after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Transition applied, nothing else to do
    None,
    /// Action not allowed in the current phase; state unchanged
    Ignored,
    OpenPicker,
    StartUpload(SelectedImage),
    Alert(String),
}

#[derive(Debug)]
pub struct UploadFlow {
    selected: Option<SelectedImage>,
    uploading: bool,
    progress: f32,
    registry: ImageRegistry,
}

impl UploadFlow {
    pub fn new(registry: ImageRegistry) -> Self {
        Self {
            selected: None,
            uploading: false,
            progress: 0.0,
            registry,
        }
    }

    pub fn phase(&self) -> Phase {
        match (&self.selected, self.uploading) {
            (_, true) => Phase::Uploading,
            (Some(_), false) => Phase::Selected,
            (None, false) => Phase::Idle,
        }
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    /// Progress of the running upload, 0-100
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    /// Apply one action and return the resulting side effect
    pub fn apply(&mut self, action: Action) -> Effect {
        // Selection and upload triggers are locked out while a transfer runs
        if self.uploading && matches!(action, Action::Pick | Action::Picked(_) | Action::Upload) {
            debug!("Ignoring {:?} while uploading", action);
            return Effect::Ignored;
        }

        match action {
            Action::Pick => Effect::OpenPicker,
            Action::Picked(outcome) => self.on_picked(outcome),
            Action::Upload => self.start_upload(),
            Action::Transfer(event) => self.on_upload_event(event),
            Action::RemoveAt(index) => self.remove_at(index),
        }
    }

    fn on_picked(&mut self, outcome: PickOutcome) -> Effect {
        match outcome {
            PickOutcome::Selected(image) => {
                info!("Selected {}", image.path().display());
                self.selected = Some(image);
                Effect::None
            }
            PickOutcome::Cancelled => Effect::None,
            PickOutcome::Failed(reason) => {
                warn!("Image picker failed: {}", reason);
                Effect::Alert(format!("An error occurred: {reason}"))
            }
        }
    }

    fn start_upload(&mut self) -> Effect {
        let Some(selected) = self.selected.clone() else {
            return Effect::Ignored;
        };
        self.uploading = true;
        self.progress = 0.0;
        Effect::StartUpload(selected)
    }

    fn on_upload_event(&mut self, event: UploadEvent) -> Effect {
        if !self.uploading {
            warn!("Dropping upload event with no upload running: {:?}", event);
            return Effect::Ignored;
        }

        match event {
            UploadEvent::Progress(percent) => {
                self.progress = percent.clamp(0.0, 100.0);
                Effect::None
            }
            UploadEvent::Success(url) => {
                self.uploading = false;
                self.progress = 0.0;
                self.selected = None;
                match self.registry.append(url) {
                    Ok(()) => Effect::None,
                    Err(e) => {
                        debug!("Uploaded image not recorded: {}", e);
                        Effect::Alert(SAVE_FAILED_MESSAGE.to_string())
                    }
                }
            }
            UploadEvent::Failure(reason) => {
                warn!("Upload failed: {}", reason);
                self.uploading = false;
                self.progress = 0.0;
                Effect::Alert(UPLOAD_FAILED_MESSAGE.to_string())
            }
        }
    }

    fn remove_at(&mut self, index: usize) -> Effect {
        match self.registry.remove_at(index) {
            Ok(Some(url)) => {
                info!("🗑️  Removed broken image {} at position {}", url, index);
                Effect::None
            }
            Ok(None) => Effect::Ignored,
            // Already logged by the registry; display failures stay silent
            Err(_) => Effect::None,
        }
    }
}
