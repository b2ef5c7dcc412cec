//! Background project I/O
//!
//! Saves and loads run on a dedicated thread so the event thread never
//! blocks on disk. The worker only ever reads a package snapshot or produces
//! a new one; swapping it into the session is left to the event thread.

use crate::codec::ProjectCodec;
use crate::error::{ProjectError, ProjectResult};
use crate::project::ProjectPackage;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Work submitted to the I/O thread
#[derive(Debug)]
pub enum IoJob {
    Save { package: ProjectPackage, path: PathBuf },
    Load { path: PathBuf },
}

/// Result of one [`IoJob`], delivered back to the event thread
#[derive(Debug)]
pub enum IoOutcome {
    Saved {
        path: PathBuf,
        result: ProjectResult<()>,
    },
    Loaded {
        path: PathBuf,
        result: ProjectResult<ProjectPackage>,
    },
}

impl IoOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            IoOutcome::Saved { path, .. } | IoOutcome::Loaded { path, .. } => path,
        }
    }
}

/// Dedicated thread running project saves and loads in submission order
pub struct ProjectWorker {
    jobs: Option<Sender<IoJob>>,
    outcomes: Receiver<IoOutcome>,
    thread: Option<JoinHandle<()>>,
}

impl ProjectWorker {
    /// Start the worker thread
    pub fn spawn(codec: ProjectCodec) -> io::Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<IoJob>();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

        let thread = thread::Builder::new()
            .name("photomeasure-io".to_string())
            .spawn(move || Self::run(&codec, &job_rx, &outcome_tx))?;

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            thread: Some(thread),
        })
    }

    /// Queue a job
    pub fn submit(&self, job: IoJob) -> ProjectResult<()> {
        self.jobs
            .as_ref()
            .ok_or(ProjectError::WorkerStopped)?
            .send(job)
            .map_err(|_| ProjectError::WorkerStopped)
    }

    /// Next finished outcome, if one is ready
    pub fn try_recv(&self) -> Option<IoOutcome> {
        match self.outcomes.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next outcome
    pub fn recv_timeout(&self, timeout: Duration) -> Option<IoOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Finish queued jobs, then stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the job channel ends the worker loop once the queue drains.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("project I/O thread panicked");
            }
        }
    }

    fn run(codec: &ProjectCodec, jobs: &Receiver<IoJob>, outcomes: &Sender<IoOutcome>) {
        tracing::debug!("project I/O thread started");
        for job in jobs.iter() {
            let outcome = match job {
                IoJob::Save { package, path } => {
                    let result = codec.save(&package, &path);
                    IoOutcome::Saved { path, result }
                }
                IoJob::Load { path } => {
                    let result = codec.load(&path);
                    IoOutcome::Loaded { path, result }
                }
            };
            if outcomes.send(outcome).is_err() {
                break;
            }
        }
        tracing::debug!("project I/O thread stopped");
    }
}

impl Drop for ProjectWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MeasurementCollection;
    use crate::project::{ImageRef, ImageSize, ProjectMetadata};

    #[test]
    fn test_save_then_load_in_background() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let image_path = dir.path().join("photo.png");
        image::RgbImage::new(4, 4).save(&image_path).unwrap();
        let size = ImageSize::new(4, 4);
        let package = ProjectPackage {
            metadata: ProjectMetadata::new(size, None),
            image: ImageRef::new(&image_path, size),
            measurements: MeasurementCollection::new(),
        };
        let project = dir.path().join("bg.pmproj");

        let worker = ProjectWorker::spawn(ProjectCodec::new(dir.path())).unwrap();
        worker
            .submit(IoJob::Save {
                package: package.clone(),
                path: project.clone(),
            })
            .unwrap();
        worker
            .submit(IoJob::Load {
                path: project.clone(),
            })
            .unwrap();

        let saved = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(saved, IoOutcome::Saved { result: Ok(()), .. }));

        match worker.recv_timeout(Duration::from_secs(10)).unwrap() {
            IoOutcome::Loaded { path, result } => {
                assert_eq!(path, project);
                assert_eq!(result.unwrap().metadata, package.metadata);
            }
            other => panic!("expected load outcome, got {other:?}"),
        }

        worker.shutdown();
    }

    #[test]
    fn test_failures_come_back_as_outcomes() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let worker = ProjectWorker::spawn(ProjectCodec::new(dir.path())).unwrap();
        let missing = dir.path().join("missing.pmproj");
        worker.submit(IoJob::Load { path: missing.clone() }).unwrap();

        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.path(), &missing);
        assert!(matches!(
            outcome,
            IoOutcome::Loaded {
                result: Err(ProjectError::CorruptProject { .. }),
                ..
            }
        ));
        assert!(worker.try_recv().is_none());
    }
}
