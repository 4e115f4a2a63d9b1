//! Background decoding with an explicit readiness handle.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use procgen::{FeatureSource, PendingSource, SetupError};

use crate::decode::decode_wav;
use crate::error::MediaError;
use crate::track::AnalysedTrack;

/// A track being decoded on a worker thread.
pub struct PendingTrack {
    path: PathBuf,
    receiver: Receiver<Result<AnalysedTrack, MediaError>>,
    finished: Option<Result<AnalysedTrack, MediaError>>,
}

impl std::fmt::Debug for PendingTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTrack")
            .field("path", &self.path)
            .field("finished", &self.finished.is_some())
            .finish()
    }
}

/// Starts decoding and analysing `path` off the calling thread.
pub fn load_async(path: impl AsRef<Path>, bins: usize) -> PendingTrack {
    let path = path.as_ref().to_path_buf();
    let (sender, receiver) = bounded(1);
    let worker_path = path.clone();
    let spawned = thread::Builder::new()
        .name("audio-loader".into())
        .spawn(move || {
            let result = decode_wav(&worker_path).and_then(|audio| AnalysedTrack::new(audio, bins));
            match &result {
                Ok(track) => tracing::info!(
                    path = %worker_path.display(),
                    seconds = track.audio().duration().as_secs_f32(),
                    bins,
                    "audio ready"
                ),
                Err(err) => tracing::warn!(path = %worker_path.display(), error = %err, "audio load failed"),
            }
            // The receiver may already be gone if setup was abandoned.
            let _ = sender.send(result);
        });

    let finished = match spawned {
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(error = %err, "could not spawn audio loader; decoding inline");
            Some(decode_wav(&path).and_then(|audio| AnalysedTrack::new(audio, bins)))
        }
    };

    PendingTrack {
        path,
        receiver,
        finished,
    }
}

impl PendingTrack {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking poll; true once the worker has produced a result.
    pub fn is_ready(&mut self) -> bool {
        if self.finished.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.finished = Some(result);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.finished = Some(Err(MediaError::Disconnected {
                    path: self.path.clone(),
                }));
                true
            }
        }
    }

    /// Blocks until the track is decoded.
    pub fn wait_track(mut self) -> Result<AnalysedTrack, MediaError> {
        if let Some(result) = self.finished.take() {
            return result;
        }
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(MediaError::Disconnected { path: self.path }))
    }
}

impl PendingSource for PendingTrack {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn wait(self: Box<Self>) -> Result<Box<dyn FeatureSource>, SetupError> {
        let path = self.path.clone();
        match self.wait_track() {
            Ok(track) => Ok(Box::new(track)),
            Err(err) => Err(SetupError::Asset {
                path,
                reason: err.to_string(),
            }),
        }
    }
}
