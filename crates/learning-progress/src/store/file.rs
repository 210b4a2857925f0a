use std::{
	fmt::Write as _,
	fs, io,
	path::{Path, PathBuf},
};

use tracing::debug;

use super::{KeyValueStore, StorageError};

/// One file per key under a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
	root: PathBuf,
}

impl FileStore {
	pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
		let root = root.as_ref().to_path_buf();
		fs::create_dir_all(&root)?;
		debug!(root = %root.display(), "Opened progress file store");
		Ok(Self { root })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Keys contain `:` and arbitrary user ids, so anything outside `[A-Za-z0-9_-]` is
	/// percent-encoded.
	fn path_for(&self, key: &str) -> PathBuf {
		let mut name = String::with_capacity(key.len() + 5);
		for byte in key.bytes() {
			if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
				name.push(char::from(byte));
			} else {
				let _ = write!(name, "%{byte:02X}");
			}
		}
		name.push_str(".json");
		self.root.join(name)
	}
}

fn map_write_error(key: &str, e: io::Error) -> StorageError {
	if is_out_of_space(&e) {
		StorageError::QuotaExceeded {
			key: key.to_string(),
		}
	} else {
		StorageError::Io(e)
	}
}

#[cfg(unix)]
fn is_out_of_space(e: &io::Error) -> bool {
	e.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(not(unix))]
const fn is_out_of_space(_e: &io::Error) -> bool {
	false
}

impl KeyValueStore for FileStore {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		match fs::read_to_string(self.path_for(key)) {
			Ok(value) => Ok(Some(value)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let path = self.path_for(key);
		let tmp = path.with_extension("json.tmp");

		fs::write(&tmp, value).map_err(|e| map_write_error(key, e))?;
		fs::rename(&tmp, &path).map_err(|e| map_write_error(key, e))
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}
