use iced::widget::{button, container, image, progress_bar, scrollable, text, Column};
use iced::{window, ContentFit, Element, Length, Size, Subscription, Task, Theme};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod picker;
mod state;
mod ui;
mod upload;

use config::Config;
use picker::{PickOutcome, PickerOptions};
use state::flow::{Action, Effect, Phase, UploadFlow};
use state::registry::ImageRegistry;
use state::store::{KeyValueStore, MemoryStore, SqliteStore};
use ui::gallery::{self, Gallery};
use upload::{ObjectStore, S3ObjectStore, UploadEvent};

/// Main application state
struct CloudGallery {
    /// Selection, upload progress and the image registry
    flow: UploadFlow,
    /// Thumbnails for the registry's URLs
    gallery: Gallery,
    config: Config,
    /// Set once the object store has been initialized
    store: Option<Arc<dyn ObjectStore>>,
    http: reqwest::Client,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked "Pick image"
    PickImage,
    /// The picker dialog closed
    ImagePicked(PickOutcome),
    /// User clicked "Upload image"
    UploadImage,
    /// Event from the running upload
    Upload(UploadEvent),
    /// Background object store initialization finished
    StorageReady(Result<Arc<S3ObjectStore>, String>),
    /// A gallery image finished downloading (or failed to)
    ThumbnailLoaded(String, Result<image::Handle, String>),
    WindowResized(Size),
    AlertClosed,
}

impl CloudGallery {
    /// Create a new instance of the application
    fn new(config: Config) -> (Self, Task<Message>) {
        let flow = UploadFlow::new(open_registry(&config));
        info!(
            "🎨 Cloud Gallery initialized with {} images",
            flow.registry().len()
        );

        let storage = config.storage.clone();
        let connect = Task::perform(
            async move {
                S3ObjectStore::connect(&storage)
                    .await
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            },
            Message::StorageReady,
        );

        let mut app = CloudGallery {
            flow,
            gallery: Gallery::new(config.window.width),
            config,
            store: None,
            http: reqwest::Client::new(),
        };
        let fetch = app.sync_gallery();

        (app, Task::batch([connect, fetch]))
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PickImage => self.apply(Action::Pick),
            Message::ImagePicked(outcome) => self.apply(Action::Picked(outcome)),
            Message::UploadImage => self.apply(Action::Upload),
            Message::Upload(event) => self.apply(Action::Transfer(event)),
            Message::StorageReady(Ok(store)) => {
                self.store = Some(store);
                Task::none()
            }
            Message::StorageReady(Err(e)) => {
                warn!("⚠️  Uploads unavailable: {}", e);
                Task::none()
            }
            Message::ThumbnailLoaded(url, result) => {
                self.gallery.loaded(&url, result);
                self.remove_broken()
            }
            Message::WindowResized(size) => {
                self.gallery.resize(size.width);
                Task::none()
            }
            Message::AlertClosed => Task::none(),
        }
    }

    /// Run one state machine transition and carry out its effect
    fn apply(&mut self, action: Action) -> Task<Message> {
        let task = match self.flow.apply(action) {
            Effect::None | Effect::Ignored => Task::none(),
            Effect::OpenPicker => {
                let options = PickerOptions {
                    save_dir: self.config.picker.save_dir.clone(),
                };
                Task::perform(picker::pick(options), Message::ImagePicked)
            }
            Effect::StartUpload(selected) => match &self.store {
                Some(store) => Task::run(
                    upload::upload(store.clone(), selected, &self.config.storage.key_prefix),
                    Message::Upload,
                ),
                None => Task::done(Message::Upload(UploadEvent::Failure(
                    "object store is not available".to_string(),
                ))),
            },
            Effect::Alert(message) => Task::perform(show_alert(message), |_| Message::AlertClosed),
        };

        Task::batch([task, self.sync_gallery()])
    }

    /// Remove every entry whose image failed to load, one position at a time
    fn remove_broken(&mut self) -> Task<Message> {
        while let Some(index) = self.gallery.first_failed(self.flow.registry().urls()) {
            let before = self.flow.registry().len();
            self.flow.apply(Action::RemoveAt(index));
            if self.flow.registry().len() == before {
                // Persisting failed; keep the entry rather than spin
                break;
            }
        }
        self.sync_gallery()
    }

    /// Start fetches for registry entries the gallery has not seen yet
    fn sync_gallery(&mut self) -> Task<Message> {
        let pending = self.gallery.sync(self.flow.registry().urls());
        Task::batch(pending.into_iter().map(|url| {
            let key = url.clone();
            Task::perform(
                gallery::fetch_thumbnail(self.http.clone(), url),
                move |result| Message::ThumbnailLoaded(key.clone(), result),
            )
        }))
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let uploading = self.flow.is_uploading();

        let mut content = Column::new()
            .spacing(20)
            .padding(20)
            .width(Length::Fill)
            .push(
                button(text("Pick image"))
                    .on_press_maybe((!uploading).then_some(Message::PickImage))
                    .padding(10)
                    .width(Length::Fill),
            );

        if let Some(selected) = self.flow.selected() {
            content = content.push(
                container(
                    image(image::Handle::from_path(selected.path()))
                        .height(Length::Fixed(200.0))
                        .content_fit(ContentFit::Contain),
                )
                .center_x(Length::Fill),
            );

            if uploading {
                content = content.push(
                    progress_bar(0.0..=100.0, self.flow.progress()).height(Length::Fixed(3.0)),
                );
            }

            let label = match self.flow.phase() {
                Phase::Uploading => "Uploading ...",
                Phase::Idle | Phase::Selected => "Upload image",
            };
            content = content.push(
                button(text(label))
                    .on_press_maybe((!uploading).then_some(Message::UploadImage))
                    .padding(10)
                    .width(Length::Fill),
            );
        }

        let urls = self.flow.registry().urls();
        content = content
            .push(container(text(gallery::heading(urls.len())).size(16)).center_x(Length::Fill))
            .push(self.gallery.view(urls));

        scrollable(content).into()
    }

    fn subscription(&self) -> Subscription<Message> {
        window::resize_events().map(|(_id, size)| Message::WindowResized(size))
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Light
    }
}

/// Open the registry database, falling back to an in-memory store so the
/// screen stays usable when the database cannot be opened
fn open_registry(config: &Config) -> ImageRegistry {
    let path = config
        .database_path
        .clone()
        .or_else(SqliteStore::default_path);

    let store: Box<dyn KeyValueStore> = match path.map(|p| SqliteStore::open(&p)) {
        Some(Ok(store)) => Box::new(store),
        Some(Err(e)) => {
            error!("Failed to open registry database, changes will not persist: {}", e);
            Box::new(MemoryStore::new())
        }
        None => {
            warn!("Could not determine user data directory, changes will not persist");
            Box::new(MemoryStore::new())
        }
    };

    ImageRegistry::load(store)
}

/// Show a native alert and wait for it to be dismissed
async fn show_alert(message: String) {
    let _ = rfd::AsyncMessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("Cloud Gallery")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show()
        .await;
}

fn load_config(path: Option<PathBuf>) -> Config {
    if path.is_none() {
        if let Some(default_path) = config::default_config_path().filter(|p| !p.exists()) {
            match config::save_to_path(&Config::default(), &default_path) {
                Ok(()) => info!("📝 Wrote default settings to {}", default_path.display()),
                Err(e) => warn!("Could not write default settings: {}", e),
            }
        }
    }

    match config::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to read settings, using defaults: {}", e);
            Config::default()
        }
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = pico_args::Arguments::from_env();
    let config_path: Option<PathBuf> = match args.opt_value_from_str("--config") {
        Ok(path) => path,
        Err(e) => {
            warn!("Ignoring --config: {}", e);
            None
        }
    };

    let config = load_config(config_path);
    let window_size = Size::new(config.window.width, config.window.height);

    iced::application("Cloud Gallery", CloudGallery::update, CloudGallery::view)
        .subscription(CloudGallery::subscription)
        .theme(CloudGallery::theme)
        .window_size(window_size)
        .centered()
        .run_with(move || CloudGallery::new(config))
}
