//! Camera frame hand-off between the capture side and the render loop.
//!
//! A bounded channel with capacity equal to the buffering depth stands in
//! for the frame semaphores: the producer blocks once every buffer is in
//! flight, and the consumer waits at most `max_wait` for a late frame.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use glam::{Mat4, Vec3};
use smallvec::{smallvec, SmallVec};

use crate::config::FrameConfig;
use crate::error::{ReconstructionError, Result};
use crate::occlusion::{ColorImage, SegmentationMask};

/// Everything the render loop consumes for one frame.
#[derive(Clone, Debug)]
pub struct CameraFrame {
  pub index: u64,
  /// Camera-to-world transform.
  pub pose: Mat4,
  /// Reduced-resolution camera frustum used for occlusion and color.
  pub view_projection: Mat4,
  /// One (mono) or two (stereo) eye frusta used for rendering.
  pub eye_view_projections: SmallVec<[Mat4; 2]>,
  pub color: ColorImage,
  pub segmentation: SegmentationMask,
}

impl CameraFrame {
  /// Mono frame rendering through the camera frustum itself.
  pub fn new(
    index: u64,
    pose: Mat4,
    view_projection: Mat4,
    color: ColorImage,
    segmentation: SegmentationMask,
  ) -> Self {
    Self {
      index,
      pose,
      view_projection,
      eye_view_projections: smallvec![view_projection],
      color,
      segmentation,
    }
  }

  pub fn with_eye_views(mut self, views: impl IntoIterator<Item = Mat4>) -> Self {
    self.eye_view_projections = views.into_iter().collect();
    self
  }

  pub fn camera_position(&self) -> Vec3 {
    self.pose.w_axis.truncate()
  }

  pub fn is_stereo(&self) -> bool {
    self.eye_views().len() == 2
  }

  pub fn eye_views(&self) -> &[Mat4] {
    &self.eye_view_projections
  }
}

/// Bounded frame channel sized by `config.buffering`.
pub fn frame_channel(config: &FrameConfig) -> (FrameSender, FrameReceiver) {
  let (sender, receiver) = bounded(config.buffering.clamp(2, 3));
  (
    FrameSender { sender },
    FrameReceiver {
      receiver,
      max_wait: config.max_wait,
    },
  )
}

#[derive(Clone, Debug)]
pub struct FrameSender {
  sender: Sender<CameraFrame>,
}

impl FrameSender {
  /// Blocks while every buffer is in flight.
  pub fn send(&self, frame: CameraFrame) -> Result<()> {
    self
      .sender
      .send(frame)
      .map_err(|_| ReconstructionError::FrameSourceClosed)
  }

  /// Hands the frame back when every buffer is in flight.
  pub fn try_send(&self, frame: CameraFrame) -> std::result::Result<(), CameraFrame> {
    self.sender.try_send(frame).map_err(|e| match e {
      TrySendError::Full(frame) | TrySendError::Disconnected(frame) => frame,
    })
  }

  pub fn in_flight(&self) -> usize {
    self.sender.len()
  }
}

#[derive(Debug)]
pub struct FrameReceiver {
  receiver: Receiver<CameraFrame>,
  max_wait: Duration,
}

impl FrameReceiver {
  pub fn max_wait(&self) -> Duration {
    self.max_wait
  }

  /// Newest available frame, waiting at most `max_wait` for one. Older
  /// queued frames are released to the producer.
  pub fn next_frame(&self) -> Result<CameraFrame> {
    let first = self.receiver.recv_timeout(self.max_wait).map_err(|e| match e {
      RecvTimeoutError::Timeout => ReconstructionError::FrameTimeout {
        waited_ms: self.max_wait.as_millis() as u64,
      },
      RecvTimeoutError::Disconnected => ReconstructionError::FrameSourceClosed,
    })?;
    Ok(self.receiver.try_iter().last().unwrap_or(first))
  }

  /// Newest frame if one is already queued.
  pub fn try_next_frame(&self) -> Option<CameraFrame> {
    self.receiver.try_iter().last()
  }
}
