/// Native image picker
///
/// Wraps the platform file dialog and, optionally, copies the chosen file into
/// an application-owned directory before handing it to the upload flow.
use rfd::AsyncFileDialog;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::state::data::SelectedImage;

/// File extensions offered by the picker
const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// Outcome of a single picker interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Selected(SelectedImage),
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct PickerOptions {
    /// When set, the picked file is copied here and the copy is selected
    pub save_dir: Option<PathBuf>,
}

/// Show the picker dialog and wait for the user's choice
pub async fn pick(options: PickerOptions) -> PickOutcome {
    let file = AsyncFileDialog::new()
        .set_title("Select Image")
        .add_filter("Images", &IMAGE_EXTENSIONS)
        .pick_file()
        .await;

    let Some(file) = file else {
        info!("You cancelled image picker");
        return PickOutcome::Cancelled;
    };

    let picked = file.path().to_path_buf();
    debug!("Picked {}", picked.display());

    match options.save_dir {
        Some(dir) => match copy_into(&picked, &dir).await {
            Ok(copy) => PickOutcome::Selected(SelectedImage::new(copy)),
            Err(e) => PickOutcome::Failed(e),
        },
        None => PickOutcome::Selected(SelectedImage::new(picked)),
    }
}

/// Copy `source` into `dir`, keeping its file name
async fn copy_into(source: &Path, dir: &Path) -> Result<PathBuf, String> {
    let file_name = source
        .file_name()
        .ok_or_else(|| format!("{} has no file name", source.display()))?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;

    let destination = dir.join(file_name);
    tokio::fs::copy(source, &destination)
        .await
        .map_err(|e| format!("Failed to copy {}: {}", source.display(), e))?;

    info!("📸 Saved picked image to {}", destination.display());
    Ok(destination)
}
