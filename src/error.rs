use thiserror::Error;

/// I/O errors that can occur when reading from remote storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors raised by a pyramid backend while opening or decoding a slide.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The slide object does not exist in storage
    #[error("Slide not found: {0}")]
    NotFound(String),

    /// I/O failure while reading slide bytes
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The file is readable but not a format the backend understands
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// The file parsed but does not describe a usable pyramid
    #[error("Invalid pyramid: {0}")]
    InvalidPyramid(String),

    /// Level index outside the pyramid
    #[error("Invalid level: {level} (slide has {level_count} levels)")]
    InvalidLevel { level: usize, level_count: usize },

    /// The slide carries no associated image with this name
    #[error("No associated image named '{0}'")]
    NoAssociatedImage(String),

    /// Pixel data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Closed set of failure categories surfaced by the tile resolver.
///
/// The server layer is the only place these are mapped to HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Internal,
}

/// Errors produced while serving info, properties, associated images or tiles.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The backend could not open the slide
    #[error("Unsupported or missing image file with ID '{image_id}'")]
    NotFound {
        image_id: String,
        #[source]
        source: BackendError,
    },

    /// Identifier contains characters outside `[A-Za-z0-9_]`
    #[error("Invalid image ID")]
    InvalidImageId { image_id: String },

    /// The slide has no label/thumbnail image
    #[error("No {name} image for ID '{image_id}'")]
    AssociatedImageNotFound { image_id: String, name: String },

    /// Region string failed validation
    #[error("Bad resource request: {input}")]
    BadRequest { input: String },

    /// Region is valid but would need an unreasonably large source window
    #[error("Region too large: {input} needs a {window}px source window (max {max})")]
    RegionTooLarge {
        input: String,
        window: u64,
        max: u64,
    },

    /// The slide opened, but decoding a region from it failed
    #[error("Error reading image file with ID '{image_id}'")]
    ImageRead {
        image_id: String,
        #[source]
        source: BackendError,
    },

    /// A scanner color transform could not be built or applied
    #[error("Error applying color correction")]
    ColorTransform { message: String },

    /// JPEG encoding failed
    #[error("Failed to encode image")]
    EncodeError { message: String },

    /// Anything else (e.g. a blocking task panicked)
    #[error("Internal server error")]
    Internal { message: String },
}

impl TileError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TileError::NotFound { .. }
            | TileError::InvalidImageId { .. }
            | TileError::AssociatedImageNotFound { .. } => ErrorKind::NotFound,
            TileError::BadRequest { .. } | TileError::RegionTooLarge { .. } => {
                ErrorKind::BadRequest
            }
            TileError::ImageRead { .. }
            | TileError::ColorTransform { .. }
            | TileError::EncodeError { .. }
            | TileError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Short machine-readable identifier used in error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            TileError::NotFound { .. } | TileError::AssociatedImageNotFound { .. } => "not_found",
            TileError::InvalidImageId { .. } => "invalid_image_id",
            TileError::BadRequest { .. } => "bad_request",
            TileError::RegionTooLarge { .. } => "region_too_large",
            TileError::ImageRead { .. } => "image_read_error",
            TileError::ColorTransform { .. } => "color_transform_error",
            TileError::EncodeError { .. } => "encode_error",
            TileError::Internal { .. } => "internal_error",
        }
    }

    /// Detail that is only safe to expose in debug logs.
    ///
    /// The `Display` message of every variant is what clients see; causes
    /// such as paths, OS errors or panic text live here.
    pub fn detail(&self) -> Option<String> {
        match self {
            TileError::NotFound { source, .. } | TileError::ImageRead { source, .. } => {
                Some(source.to_string())
            }
            TileError::ColorTransform { message }
            | TileError::EncodeError { message }
            | TileError::Internal { message } => Some(message.clone()),
            _ => None,
        }
    }
}
