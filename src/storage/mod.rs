use std::fmt;
use std::io::Write;

use crate::error::QtlError;

pub mod gcs;
pub mod local;

pub use gcs::{GcsOptions, GcsStorage};
pub use local::LocalStorage;

pub const GCS_SCHEME: &str = "gs://";

/// Minimal capability set the manifest scan needs from a backend.
///
/// Paths are the backend's own string form: plain filesystem paths for
/// [`LocalStorage`], `gs://bucket/key` URLs for [`GcsStorage`].
pub trait Storage: Send + Sync {
    /// Immediate children of `path`, in the order the backend reports them.
    fn list(&self, path: &str) -> Result<Vec<String>, QtlError>;
    fn exists(&self, path: &str) -> Result<bool, QtlError>;
    fn open_for_write(&self, path: &str) -> Result<Box<dyn WriteSink>, QtlError>;
}

/// Byte sink returned by [`Storage::open_for_write`].
///
/// Nothing becomes visible at the destination until `finish` succeeds; a sink
/// dropped without `finish` leaves the destination untouched.
pub trait WriteSink: Write + Send {
    fn finish(self: Box<Self>) -> Result<(), QtlError>;
}

/// Opens `path`, hands the sink to `write`, and finishes it only if `write` succeeded.
pub fn write_with<S, F>(storage: &S, path: &str, write: F) -> Result<(), QtlError>
where
    S: Storage + ?Sized,
    F: FnOnce(Box<dyn WriteSink>) -> Result<Box<dyn WriteSink>, QtlError>,
{
    let sink = storage.open_for_write(path)?;
    let sink = write(sink)?;
    sink.finish()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(String),
    Gcs { bucket: String, prefix: String },
}

impl Location {
    pub fn parse(value: &str) -> Result<Self, QtlError> {
        if value.trim().is_empty() {
            return Err(QtlError::InvalidLocation(
                "path must be a non-empty string".to_string(),
            ));
        }
        let Some(rest) = value.strip_prefix(GCS_SCHEME) else {
            return Ok(Location::Local(value.to_string()));
        };
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(QtlError::InvalidLocation(format!(
                "missing bucket name in {value}"
            )));
        }
        Ok(Location::Gcs {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    pub fn is_object_store(&self) -> bool {
        matches!(self, Location::Gcs { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{path}"),
            Location::Gcs { bucket, prefix } if prefix.is_empty() => {
                write!(f, "{GCS_SCHEME}{bucket}")
            }
            Location::Gcs { bucket, prefix } => write!(f, "{GCS_SCHEME}{bucket}/{prefix}"),
        }
    }
}

pub fn open_storage(location: &Location, gcs: &GcsOptions) -> Result<Box<dyn Storage>, QtlError> {
    match location {
        Location::Local(_) => Ok(Box::new(LocalStorage::new())),
        Location::Gcs { .. } => Ok(Box::new(GcsStorage::new(gcs.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_gcs_location() {
        let location = Location::parse("gs://bucket/eqtl/susie/").unwrap();
        assert_eq!(
            location,
            Location::Gcs {
                bucket: "bucket".to_string(),
                prefix: "eqtl/susie".to_string(),
            }
        );
        assert_eq!(location.to_string(), "gs://bucket/eqtl/susie");

        let bare = Location::parse("gs://bucket").unwrap();
        assert_eq!(bare.to_string(), "gs://bucket");
    }

    #[test]
    fn parse_local_location() {
        let location = Location::parse("/data/qtl").unwrap();
        assert_eq!(location, Location::Local("/data/qtl".to_string()));
        assert!(!location.is_object_store());
    }

    #[test]
    fn local_location_keeps_surrounding_spaces() {
        let location = Location::parse(" /data/with space ").unwrap();
        assert_eq!(location, Location::Local(" /data/with space ".to_string()));
        assert_eq!(location.to_string(), " /data/with space ");
    }

    #[test]
    fn reject_empty_locations() {
        assert_matches!(Location::parse("  "), Err(QtlError::InvalidLocation(_)));
        assert_matches!(Location::parse("gs://"), Err(QtlError::InvalidLocation(_)));
        assert_matches!(
            Location::parse("gs:///prefix"),
            Err(QtlError::InvalidLocation(_))
        );
    }
}
