use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Error, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Sibling of `path` that a new version is written to before the rename.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace the file at `path` with `contents`.
///
/// The bytes go to a temporary sibling first and are renamed over the target,
/// so a concurrent reader sees either the old file or the new one.
///
/// # Errors
/// * Any I/O error from writing, syncing or renaming the file
pub fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

/// Write `value` to `path` as gzip-compressed bincode.
///
/// The snapshot is written next to the target and renamed over it, so a crash
/// mid-write leaves the previous snapshot intact.
pub fn save_snapshot<T: Serialize>(value: &T, path: &Path) -> std::io::Result<()> {
    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, value).map_err(|e| Error::new(ErrorKind::Other, e))?;

    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .finish()?
        .sync_all()?;
    fs::rename(&tmp, path)?;

    Ok(())
}

pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let value: T =
        deserialize_from(&mut reader).map_err(|e| Error::new(ErrorKind::InvalidData, e))?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        names: Vec<String>,
        rate: Option<f64>,
    }

    #[test]
    fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin.gz");
        let sample = Sample {
            names: vec!["Kitchen".into(), "Hall".into()],
            rate: Some(85.0),
        };

        save_snapshot(&sample, &path).unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let loaded: Sample = load_snapshot(&path).unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn replace_file_swaps_whole_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"{\"old\": true, \"padding\": \"xxxxxxxxxxxxxxxx\"}").unwrap();

        replace_file(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn garbage_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin.gz");
        fs::write(&path, b"not a snapshot").unwrap();

        let err = load_snapshot::<Sample>(&path).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidData | ErrorKind::InvalidInput));
    }
}
