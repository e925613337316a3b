pub mod gltf;

use self::gltf::ImportedModel;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read model at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse model: {0}")]
    Parse(#[source] ::gltf::Error),
    #[error("model contains no drawable geometry")]
    NoGeometry,
    #[error("model geometry is Draco-compressed, which is not supported")]
    UnsupportedCompression,
    #[error("load cancelled")]
    Cancelled,
    #[error("loader thread could not be started: {0}")]
    Spawn(#[source] io::Error),
    #[error("loader thread stopped without a result")]
    WorkerLost,
}

#[derive(Debug)]
pub struct LoadedModel {
    pub name: String,
    pub path: PathBuf,
    pub model: ImportedModel,
}

#[derive(Debug)]
pub enum LoadEvent {
    Progress { loaded: u64, total: Option<u64> },
    Loaded(LoadedModel),
    Failed(AssetError),
}

struct LoadMessage {
    session: u64,
    event: LoadEvent,
}

/// Percentage shown by the loading bar.
///
/// Never decreases within one load. A progress report without a known total
/// leaves it where it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingProgress {
    percent: u8,
    active: bool,
}

impl LoadingProgress {
    pub fn start(&mut self) {
        self.percent = 0;
        self.active = true;
    }

    pub fn report(&mut self, loaded: u64, total: Option<u64>) {
        let Some(total) = total.filter(|total| *total > 0) else {
            return;
        };
        let percent = (loaded.saturating_mul(100) / total).min(100) as u8;
        self.percent = self.percent.max(percent);
    }

    pub fn finish(&mut self) {
        self.percent = 100;
        self.active = false;
    }

    /// Loading stopped without a model; hide the indicator.
    pub fn clear(&mut self) {
        self.active = false;
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// One in-flight model load on a worker thread.
///
/// Events are tagged with the session that started the load; anything from
/// another session is dropped on receipt.
pub struct AssetLoader {
    session: u64,
    path: PathBuf,
    receiver: Option<Receiver<LoadMessage>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl AssetLoader {
    pub fn spawn(path: PathBuf, session: u64) -> Result<Self, AssetError> {
        let (sender, receiver) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker = {
            let path = path.clone();
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name(format!("model-loader-{session}"))
                .spawn(move || run_load(&path, session, &cancel, &sender))
                .map_err(AssetError::Spawn)?
        };
        log::info!("[session {}] loading {}", session, path.display());
        Ok(Self {
            session,
            path,
            receiver: Some(receiver),
            cancel,
            worker: Some(worker),
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain queued events without blocking.
    pub fn poll(&mut self) -> Vec<LoadEvent> {
        let Some(receiver) = &self.receiver else {
            return Vec::new();
        };
        let mut events = Vec::new();
        while !self.finished {
            let message = match receiver.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) => break,
                // The worker hung up before sending a result.
                Err(TryRecvError::Disconnected) => {
                    log::error!("[session {}] loader thread exited early", self.session);
                    self.finished = true;
                    events.push(LoadEvent::Failed(AssetError::WorkerLost));
                    break;
                }
            };
            if message.session != self.session {
                continue;
            }
            if matches!(message.event, LoadEvent::Loaded(_) | LoadEvent::Failed(_)) {
                self.finished = true;
            }
            events.push(message.event);
        }
        if self.finished {
            self.receiver = None;
            self.reap();
        }
        events
    }

    /// Stop listening. The worker notices the flag between chunks; a parse
    /// already underway runs to completion and its result is discarded.
    pub fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.receiver = None;
        self.reap();
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run_load(path: &Path, session: u64, cancel: &AtomicBool, sender: &Sender<LoadMessage>) {
    let send = |event| {
        // A closed channel means the session is gone.
        let _ = sender.send(LoadMessage { session, event });
    };
    let event = match load_model(path, cancel, |loaded, total| {
        send(LoadEvent::Progress { loaded, total })
    }) {
        Ok(model) => LoadEvent::Loaded(model),
        Err(err) => LoadEvent::Failed(err),
    };
    send(event);
}

/// Read and parse a model on the calling thread.
pub fn load_model(
    path: &Path,
    cancel: &AtomicBool,
    on_progress: impl FnMut(u64, Option<u64>),
) -> Result<LoadedModel, AssetError> {
    let read_error = |source| AssetError::Read {
        path: path.display().to_string(),
        source,
    };
    let file = File::open(path).map_err(read_error)?;
    let total = file.metadata().ok().map(|meta| meta.len());
    let bytes = read_with_progress(file, total, cancel, on_progress)?;
    if cancel.load(Ordering::Acquire) {
        return Err(AssetError::Cancelled);
    }
    let model = gltf::import(&bytes, path.parent())?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("model")
        .to_string();
    Ok(LoadedModel {
        name,
        path: path.to_path_buf(),
        model,
    })
}

/// Read `reader` to the end in chunks, reporting bytes read so far.
pub fn read_with_progress<R: Read>(
    mut reader: R,
    total: Option<u64>,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(u64, Option<u64>),
) -> Result<Vec<u8>, AssetError> {
    let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.load(Ordering::Acquire) {
            return Err(AssetError::Cancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(AssetError::Read {
                    path: String::from("<stream>"),
                    source,
                })
            }
        };
        bytes.extend_from_slice(&chunk[..read]);
        on_progress(bytes.len() as u64, total);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn progress_is_monotonic_and_resets() {
        let mut progress = LoadingProgress::default();
        progress.start();
        progress.report(50, Some(200));
        assert_eq!(progress.percent(), 25);
        progress.report(10, Some(200));
        assert_eq!(progress.percent(), 25);
        progress.report(199, Some(200));
        assert_eq!(progress.percent(), 99);
        progress.report(500, Some(200));
        assert_eq!(progress.percent(), 100);

        progress.start();
        assert_eq!(progress.percent(), 0);
        assert!(progress.is_active());
    }

    #[test]
    fn unknown_total_leaves_percent_alone() {
        let mut progress = LoadingProgress::default();
        progress.start();
        progress.report(30, Some(100));
        progress.report(1_000_000, None);
        progress.report(5, Some(0));
        assert_eq!(progress.percent(), 30);
    }

    #[test]
    fn chunked_read_reports_each_chunk() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        let cancel = AtomicBool::new(false);
        let mut reports = Vec::new();
        let bytes = read_with_progress(Cursor::new(&data), Some(data.len() as u64), &cancel, |l, t| {
            reports.push((l, t))
        });
        assert_eq!(bytes.map(|b| b.len()).ok(), Some(data.len()));
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.last().map(|r| r.0), Some(data.len() as u64));
    }

    #[test]
    fn cancelled_read_stops() {
        let cancel = AtomicBool::new(true);
        let result = read_with_progress(Cursor::new(vec![1u8; 10]), None, &cancel, |_, _| {});
        assert!(matches!(result, Err(AssetError::Cancelled)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let cancel = AtomicBool::new(false);
        let result = load_model(Path::new("/nonexistent/model.glb"), &cancel, |_, _| {});
        assert!(matches!(result, Err(AssetError::Read { .. })));
    }

    fn drain_until_done(loader: &mut AssetLoader) -> Vec<LoadEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while !loader.is_finished() && Instant::now() < deadline {
            events.extend(loader.poll());
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn worker_loads_model_file() {
        let dir = std::env::temp_dir().join(format!("unitview-load-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("unit.glb");
        let written = std::fs::write(&path, super::gltf::tests::unit_model());
        assert!(written.is_ok());

        let Ok(mut loader) = AssetLoader::spawn(path.clone(), 3) else {
            panic!("spawn failed");
        };
        let events = drain_until_done(&mut loader);
        assert!(events
            .iter()
            .any(|e| matches!(e, LoadEvent::Progress { total: Some(_), .. })));
        let loaded = events.into_iter().find_map(|e| match e {
            LoadEvent::Loaded(model) => Some(model),
            _ => None,
        });
        assert!(loaded.is_some_and(|m| m.name == "unit.glb" && m.model.meshes == 3));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn dropped_worker_becomes_a_failure() {
        let (sender, receiver) = mpsc::channel();
        sender
            .send(LoadMessage {
                session: 4,
                event: LoadEvent::Progress {
                    loaded: 10,
                    total: Some(20),
                },
            })
            .ok();
        drop(sender);
        let mut loader = AssetLoader {
            session: 4,
            path: PathBuf::from("unit.glb"),
            receiver: Some(receiver),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            finished: false,
        };
        let events = loader.poll();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LoadEvent::Progress { loaded: 10, .. }));
        assert!(matches!(events[1], LoadEvent::Failed(AssetError::WorkerLost)));
        assert!(loader.is_finished());
        assert!(loader.poll().is_empty());
    }

    #[test]
    fn worker_reports_failure() {
        let Ok(mut loader) = AssetLoader::spawn(PathBuf::from("/nonexistent/a.glb"), 1) else {
            panic!("spawn failed");
        };
        let events = drain_until_done(&mut loader);
        assert!(matches!(
            events.last(),
            Some(LoadEvent::Failed(AssetError::Read { .. }))
        ));
        assert!(loader.poll().is_empty());
    }
}
