use std::path::{Path, PathBuf};

use crate::batch::config::{DestinationMode, RunConfig};
use crate::batch::discovery::canonical_root;
use crate::{ConvertError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub output: PathBuf,
    /// The output's parent directory does not exist yet
    pub must_create_dirs: bool,
}

/// Work out where the converted form of `input` goes.
///
/// In overwrite mode the output is the input path itself. In copy mode the
/// input's position under the source root is mirrored under the destination
/// root, with the extension swapped for the profile's.
pub fn resolve(input: &Path, config: &RunConfig) -> Result<Resolution> {
    match &config.destination {
        DestinationMode::Overwrite => Ok(Resolution {
            output: input.to_path_buf(),
            must_create_dirs: false,
        }),
        DestinationMode::CopyToFolder(destination_root) => {
            let relative = input
                .strip_prefix(&config.source_root)
                .or_else(|_| input.strip_prefix(canonical_root(&config.source_root)))
                .map_err(|_| ConvertError::Resolution {
                    path: input.to_path_buf(),
                    reason: format!("not inside source folder {}", config.source_root.display()),
                })?;

            let output = destination_root
                .join(relative)
                .with_extension(config.profile.extension());
            let must_create_dirs = output.parent().map_or(false, |dir| !dir.is_dir());

            Ok(Resolution { output, must_create_dirs })
        }
    }
}

/// An existing output is left alone unless overwriting was requested.
pub fn is_up_to_date(resolution: &Resolution, config: &RunConfig) -> bool {
    !config.overwrite() && resolution.output.exists()
}
