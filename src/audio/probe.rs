use std::{io::Cursor, time::Duration};

use bytes::Bytes;
use symphonia::core::{
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    units::Time,
};
use tracing::debug;

/// Bitrate assumed when the stream cannot be parsed (the translate endpoint
/// serves 32 kbps mono MP3).
const FALLBACK_BITRATE_BPS: u64 = 32_000;

/// Returns how long `audio` takes to play.
///
/// Uses the container's frame count when present, otherwise sums packet
/// durations, and finally falls back to a bitrate estimate for data
/// symphonia cannot read.
pub fn playback_duration(audio: &Bytes) -> Duration {
    match probe_duration(audio) {
        Some(duration) => duration,
        None => {
            debug!(
                "Could not probe {} bytes of audio, estimating from bitrate",
                audio.len()
            );
            estimate_from_bitrate(audio.len())
        }
    }
}

fn estimate_from_bitrate(len: usize) -> Duration {
    Duration::from_millis(len as u64 * 8 * 1000 / FALLBACK_BITRATE_BPS)
}

fn to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac)
}

fn probe_duration(audio: &Bytes) -> Option<Duration> {
    let source = Cursor::new(audio.to_vec());
    let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;
    let mut format = probed.format;

    let track = format.default_track()?;
    let track_id = track.id;
    let time_base = track.codec_params.time_base?;

    if let Some(frames) = track.codec_params.n_frames {
        return Some(to_duration(time_base.calc_time(frames)));
    }

    let mut total = 0u64;
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() == track_id {
            total += packet.dur;
        }
    }

    if total == 0 {
        return None;
    }
    Some(to_duration(time_base.calc_time(total)))
}
