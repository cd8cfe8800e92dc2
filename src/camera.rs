//!
//! # Camera acquisition
//!
//! A [Camera] owns one acquisition thread driving a [CameraBackend] according to the
//! [CameraMode] set by the control threads.
//! The last captured frame is published into a single slot that readers copy out;
//! a frame that is not read before the next one is lost.
//!
//! ```no_run
//! use std::time::Duration;
//! use aosim::{Camera, CameraMode, FromBuilder, Builder, Simulator};
//! # fn main() -> aosim::Result<()> {
//! let sim = Simulator::builder()
//!     .atmosphere(aosim::AtmosphereBuilder::default().wavefront_file("wavefront.png"))
//!     .build()?;
//! let camera = Camera::spawn(sim)?;
//! camera.set_mode(CameraMode::Running)?;
//! let frame = camera.wait_for_frame(0, Duration::from_secs(1));
//! camera.stop()?;
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::Frame;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("cannot spawn the acquisition thread of camera {1}")]
    Spawn(#[source] std::io::Error, String),
    #[error("acquisition thread of camera {0} panicked")]
    Panicked(String),
    #[error("camera {1} does not support the {0:?} mode")]
    Unsupported(CameraMode, String),
}

/// Camera acquisition modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    #[default]
    Off,
    Waiting,
    /// captures one frame then switches to [CameraMode::Waiting] without waiting for the
    /// frame interval; a failed capture is retried after the interval
    Single,
    /// captures frames continuously
    Running,
    Config,
}
impl CameraMode {
    fn is_capturing(&self) -> bool {
        matches!(self, Self::Single | Self::Running)
    }
}

/// Camera device interface
pub trait CameraBackend: Send + 'static {
    fn name(&self) -> &str;
    /// Writes the next frame into `frame`
    fn capture(&mut self, frame: &mut Frame) -> crate::Result<()>;
    /// Whether the device has a configuration mode
    fn supports_config(&self) -> bool {
        false
    }
    /// Time between 2 frames in running mode
    fn interval(&self) -> Duration;
    /// Brings the device to rest once acquisition has stopped
    fn park(&mut self) {}
}

#[derive(Debug, Default)]
struct State {
    mode: CameraMode,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct FrameSlot {
    frame: Frame,
    count: u64,
}

struct Shared<B> {
    name: String,
    supports_config: bool,
    state: Mutex<State>,
    mode_cond: Condvar,
    slot: Mutex<FrameSlot>,
    frame_cond: Condvar,
    backend: Mutex<B>,
}

// A panic in the acquisition thread must not lock out the control threads
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<B: CameraBackend> Shared<B> {
    // Blocks until the camera is asked to capture, `None` on shutdown
    fn next_mode(&self) -> Option<CameraMode> {
        let mut state = lock(&self.state);
        let mut reported = None;
        loop {
            if state.shutdown {
                return None;
            }
            if state.mode.is_capturing() {
                return Some(state.mode);
            }
            if reported != Some(state.mode) {
                log::info!("camera {}: {:?}", self.name, state.mode);
                reported = Some(state.mode);
            }
            state = self
                .mode_cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
    fn publish(&self, frame: &Frame) {
        let mut slot = lock(&self.slot);
        slot.frame.clone_from(frame);
        slot.count += 1;
        self.frame_cond.notify_all();
    }
    fn run(&self) {
        let mut frame = Frame::default();
        log::info!("camera {}: acquisition started", self.name);
        while let Some(mode) = self.next_mode() {
            let (captured, interval) = {
                let mut backend = lock(&self.backend);
                (backend.capture(&mut frame), backend.interval())
            };
            match captured {
                Ok(()) => {
                    self.publish(&frame);
                    if mode == CameraMode::Single {
                        let mut state = lock(&self.state);
                        if state.mode == CameraMode::Single {
                            state.mode = CameraMode::Waiting;
                            self.mode_cond.notify_all();
                        }
                        continue;
                    }
                }
                Err(e) => log::warn!("camera {}: missed frame: {}", self.name, e),
            }
            let state = lock(&self.state);
            let _ = self
                .mode_cond
                .wait_timeout_while(state, interval, |s| !s.shutdown && s.mode == mode)
                .unwrap_or_else(PoisonError::into_inner);
        }
        log::info!("camera {}: acquisition stopped", self.name);
    }
}

/// Camera with its acquisition thread
pub struct Camera<B: CameraBackend> {
    shared: Arc<Shared<B>>,
    handle: Option<JoinHandle<()>>,
}
impl<B: CameraBackend> Camera<B> {
    /// Starts the acquisition thread, the camera is [CameraMode::Off]
    pub fn spawn(backend: B) -> Result<Self, CameraError> {
        let name = backend.name().to_string();
        let shared = Arc::new(Shared {
            name: name.clone(),
            supports_config: backend.supports_config(),
            state: Mutex::new(State::default()),
            mode_cond: Condvar::new(),
            slot: Mutex::new(FrameSlot::default()),
            frame_cond: Condvar::new(),
            backend: Mutex::new(backend),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("camera-{}", name))
            .spawn(move || thread_shared.run())
            .map_err(|e| CameraError::Spawn(e, name))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }
    pub fn name(&self) -> &str {
        &self.shared.name
    }
    pub fn mode(&self) -> CameraMode {
        lock(&self.shared.state).mode
    }
    /// Sets the acquisition mode
    ///
    /// Setting the current mode does nothing; [CameraMode::Config] is rejected if the
    /// backend does not support it.
    pub fn set_mode(&self, mode: CameraMode) -> Result<(), CameraError> {
        let mut state = lock(&self.shared.state);
        if state.mode == mode {
            return Ok(());
        }
        if mode == CameraMode::Config && !self.shared.supports_config {
            log::warn!("camera {}: {:?} mode not supported", self.shared.name, mode);
            return Err(CameraError::Unsupported(mode, self.shared.name.clone()));
        }
        log::info!(
            "camera {}: mode {:?} -> {:?}",
            self.shared.name,
            state.mode,
            mode
        );
        state.mode = mode;
        self.shared.mode_cond.notify_all();
        Ok(())
    }
    /// Returns the number of frames published so far
    pub fn frame_count(&self) -> u64 {
        lock(&self.shared.slot).count
    }
    /// Returns a copy of the last frame
    pub fn latest_frame(&self) -> Option<Frame> {
        let slot = lock(&self.shared.slot);
        (slot.count > 0).then(|| slot.frame.clone())
    }
    /// Waits for a frame published after the first `after` frames
    ///
    /// Returns a copy of the last frame or `None` if none arrived within `timeout`
    pub fn wait_for_frame(&self, after: u64, timeout: Duration) -> Option<Frame> {
        let slot = lock(&self.shared.slot);
        let (slot, _) = self
            .shared
            .frame_cond
            .wait_timeout_while(slot, timeout, |s| s.count <= after)
            .unwrap_or_else(PoisonError::into_inner);
        (slot.count > after).then(|| slot.frame.clone())
    }
    /// Waits for the camera to reach `mode`, returns false on timeout
    pub fn wait_for_mode(&self, mode: CameraMode, timeout: Duration) -> bool {
        let state = lock(&self.shared.state);
        let (state, _) = self
            .shared
            .mode_cond
            .wait_timeout_while(state, timeout, |s| s.mode != mode)
            .unwrap_or_else(PoisonError::into_inner);
        state.mode == mode
    }
    /// Gives access to the backend in between frames
    pub fn with_backend<R, F: FnOnce(&mut B) -> R>(&self, f: F) -> R {
        f(&mut lock(&self.shared.backend))
    }
    /// Stops the acquisition thread and parks the backend
    pub fn stop(mut self) -> Result<(), CameraError> {
        self.shutdown()
    }
    fn shutdown(&mut self) -> Result<(), CameraError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        {
            let mut state = lock(&self.shared.state);
            state.shutdown = true;
            state.mode = CameraMode::Off;
            self.shared.mode_cond.notify_all();
        }
        let joined = handle.join();
        lock(&self.shared.backend).park();
        log::info!("camera {}: parked", self.shared.name);
        joined.map_err(|_| CameraError::Panicked(self.shared.name.clone()))
    }
}
impl<B: CameraBackend> Drop for Camera<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        interval: Duration,
    }
    impl CameraBackend for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn capture(&mut self, frame: &mut Frame) -> crate::Result<()> {
            frame.resize(4, 4, 8);
            frame.number += 1;
            Ok(())
        }
        fn interval(&self) -> Duration {
            self.interval
        }
    }

    #[test]
    fn starts_off() {
        let camera = Camera::spawn(Counter {
            interval: Duration::ZERO,
        })
        .unwrap();
        assert_eq!(camera.mode(), CameraMode::Off);
        assert!(camera.latest_frame().is_none());
        assert!(camera
            .wait_for_frame(0, Duration::from_millis(50))
            .is_none());
        camera.stop().unwrap();
    }

    #[test]
    fn same_mode_is_a_no_op() {
        let camera = Camera::spawn(Counter {
            interval: Duration::ZERO,
        })
        .unwrap();
        camera.set_mode(CameraMode::Off).unwrap();
        camera.set_mode(CameraMode::Waiting).unwrap();
        camera.set_mode(CameraMode::Waiting).unwrap();
        assert_eq!(camera.mode(), CameraMode::Waiting);
        assert_eq!(camera.frame_count(), 0);
    }

    #[test]
    fn single_frames_skip_the_interval() {
        let camera = Camera::spawn(Counter {
            interval: Duration::from_secs(30),
        })
        .unwrap();
        let timeout = Duration::from_secs(2);
        camera.set_mode(CameraMode::Single).unwrap();
        assert!(camera.wait_for_mode(CameraMode::Waiting, timeout));
        camera.set_mode(CameraMode::Single).unwrap();
        let frame = camera.wait_for_frame(1, timeout).unwrap();
        assert_eq!(frame.number, 2);
        camera.stop().unwrap();
    }
}
