//! Local capture device probing and track acquisition.

use tracing::{info, warn};

use meshcall_shared::types::ParticipantId;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::native::{LocalTrack, TrackKind};

/// Checks whether a capture device of the given kind can be opened.
pub trait DeviceProbe: Send + Sync {
    fn probe(&self, kind: TrackKind) -> Result<(), CaptureError>;
}

/// Probes the default cpal host.
///
/// cpal only knows audio devices. Camera frames are supplied by the embedding
/// application through [`LocalTrack::write_sample`], so the application tells
/// the probe whether it has a camera source at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceProbe {
    camera: bool,
}

impl CpalDeviceProbe {
    pub fn new(camera_available: bool) -> Self {
        Self {
            camera: camera_available,
        }
    }
}

impl DeviceProbe for CpalDeviceProbe {
    fn probe(&self, kind: TrackKind) -> Result<(), CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        match kind {
            TrackKind::Audio => {
                let host = cpal::default_host();
                let device = host
                    .default_input_device()
                    .ok_or(CaptureError::NoInputDevice)?;
                let name = device
                    .name()
                    .map_err(|e| CaptureError::Device(e.to_string()))?;
                info!(device = %name, "Using input device");
                Ok(())
            }
            TrackKind::Video if self.camera => Ok(()),
            TrackKind::Video => Err(CaptureError::NoCamera),
        }
    }
}

/// Create the local tracks requested by `config`.
///
/// A device that cannot be opened is skipped; the first such error is
/// returned alongside the tracks that could be created, and the call goes on
/// without that kind of media.
pub fn acquire_local_tracks(
    probe: &dyn DeviceProbe,
    config: &CaptureConfig,
    local: &ParticipantId,
) -> (Vec<LocalTrack>, Option<CaptureError>) {
    let mut tracks = Vec::new();
    let mut first_error = None;

    let wanted = [(TrackKind::Audio, config.audio), (TrackKind::Video, config.video)];
    for kind in wanted.into_iter().filter_map(|(k, on)| on.then_some(k)) {
        match probe.probe(kind) {
            Ok(()) => tracks.push(LocalTrack::new(kind, format!("{kind}-{local}"), local.as_str())),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Capture device unavailable");
                first_error.get_or_insert(e);
            }
        }
    }

    (tracks, first_error)
}
