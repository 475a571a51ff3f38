use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::{Checkpointer, Error, ExecutableResult, path_component};

/// Suffix of the sidecar file that holds captured stdout text.
const DATA_SUFFIX: &str = ".data";

/// Filesystem-based checkpointer.
///
/// Records live at `{base_path}/{namespace}/{name}` as a JSON array of path
/// strings. Stdout results additionally write `{name}.data` with the raw text
/// and record a one-element array pointing at it.
pub struct FsCheckpointer {
  base_path: PathBuf,
  namespace_path: RwLock<Option<PathBuf>>,
}

impl FsCheckpointer {
  /// Create a new filesystem checkpointer rooted at `base_path`.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
      namespace_path: RwLock::new(None),
    }
  }

  /// Directory of the current namespace, once `init` has run.
  pub fn namespace_path(&self) -> Option<PathBuf> {
    self
      .namespace_path
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  fn record_path(&self, name: &str) -> Result<PathBuf, Error> {
    let namespace = self.namespace_path().ok_or(Error::NotInitialized)?;
    Ok(namespace.join(path_component(name)))
  }
}

#[async_trait]
impl Checkpointer for FsCheckpointer {
  async fn init(&self, namespace: &str) -> Result<(), Error> {
    // Recorded sidecar paths must not depend on the working directory.
    let path = std::path::absolute(&self.base_path)?.join(path_component(namespace));
    fs::create_dir_all(&path).await?;

    debug!(namespace_path = %path.display(), "checkpoint namespace ready");

    *self
      .namespace_path
      .write()
      .unwrap_or_else(|e| e.into_inner()) = Some(path);
    Ok(())
  }

  async fn exists(&self, name: &str) -> Result<bool, Error> {
    let path = self.record_path(name)?;
    Ok(fs::try_exists(&path).await?)
  }

  async fn read(&self, name: &str) -> Result<Vec<PathBuf>, Error> {
    let path = self.record_path(name)?;
    let bytes = fs::read(&path).await.map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(name.to_string())
      } else {
        Error::Io(e)
      }
    })?;

    serde_json::from_slice(&bytes).map_err(|e| Error::Corrupt {
      name: name.to_string(),
      message: e.to_string(),
    })
  }

  async fn write(&self, name: &str, result: &ExecutableResult) -> Result<Vec<PathBuf>, Error> {
    let path = self.record_path(name)?;

    let paths = match result {
      ExecutableResult::Stdout { text } => {
        let mut data_path = path.clone().into_os_string();
        data_path.push(DATA_SUFFIX);
        let data_path = PathBuf::from(data_path);

        // Sidecar first: a record must never point at a missing file.
        write_atomic(&data_path, text.as_bytes()).await?;
        vec![data_path]
      }
      ExecutableResult::Urls { paths } => paths.clone(),
    };

    let record = serde_json::to_vec(&paths)?;
    write_atomic(&path, &record).await?;

    debug!(name = %name, record = %path.display(), "checkpoint written");
    Ok(paths)
  }
}

/// Write through a temporary sibling and rename it into place.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
  let mut tmp_name = std::ffi::OsString::from(".~");
  if let Some(name) = path.file_name() {
    tmp_name.push(name);
  }
  tmp_name.push(".tmp");
  let tmp_path = path.with_file_name(tmp_name);

  fs::write(&tmp_path, contents).await?;
  fs::rename(&tmp_path, path).await?;
  Ok(())
}
