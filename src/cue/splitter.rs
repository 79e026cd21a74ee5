use std::path::Path;

use log::{info, warn};

use crate::audio::buffer::AudioBuffer;
use crate::audio::encoder::{self, OutputFormat};
use crate::batch::runner::progress_percent;
use crate::cue::parser::CueTrack;
use crate::utils::file_ops::write_atomically;
use crate::utils::reporting::{DiagnosticSink, FailureRecord};
use crate::{ConvertError, Result};

/// Keep letters, digits, spaces, hyphens and underscores; trim the ends.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `NN - Title.flac`
pub fn track_filename(track: &CueTrack) -> String {
    let mut title = sanitize_title(&track.display_title());
    if title.is_empty() {
        title = track.label();
    }
    format!("{:02} - {}.flac", track.number, title)
}

/// Start and (exclusive) end of track `index` in milliseconds; `None` runs to the end of the audio.
pub fn track_bounds(tracks: &[CueTrack], index: usize) -> Result<(u64, Option<u64>)> {
    let track = &tracks[index];
    let bounds_error = |reason: String| ConvertError::TrackBounds {
        number: track.number,
        reason,
    };

    let start = track
        .start_ms
        .ok_or_else(|| bounds_error("no INDEX 01 start offset".to_string()))?;

    let end = match tracks.get(index + 1) {
        None => None,
        Some(next) => Some(next.start_ms.ok_or_else(|| {
            bounds_error(format!("no end, track {} has no INDEX 01", next.number))
        })?),
    };

    if let Some(end) = end {
        if end < start {
            return Err(bounds_error(format!("ends at {} ms before it starts at {} ms", end, start)));
        }
    }

    Ok((start, end))
}

/// Write every track of `audio` to `output_dir` as FLAC.
///
/// Each track is independent: a failure is recorded and the remaining tracks
/// are still written. Progress is reported after every track.
pub fn split_tracks(
    tracks: &[CueTrack],
    audio: &AudioBuffer,
    output_dir: &Path,
    sink: &dyn DiagnosticSink,
    progress: &mut dyn FnMut(u8),
) -> Vec<FailureRecord> {
    let mut failures = Vec::new();
    let total = tracks.len();

    for (index, track) in tracks.iter().enumerate() {
        match export_track(tracks, index, audio, output_dir) {
            Ok(()) => info!("Wrote {}", track_filename(track)),
            Err(e) => {
                let identifier = format!("Track {}", track.number);
                warn!("{} failed: {}", identifier, e);
                sink.record(&identifier, &e);
                failures.push(FailureRecord::new(identifier, e.to_string()));
            }
        }
        progress(progress_percent(index + 1, total));
    }

    failures
}

fn export_track(tracks: &[CueTrack], index: usize, audio: &AudioBuffer, output_dir: &Path) -> Result<()> {
    let track = &tracks[index];
    let (start, end) = track_bounds(tracks, index)?;

    let slice = audio.slice_ms(start, end);
    if slice.frames() == 0 {
        return Err(ConvertError::TrackBounds {
            number: track.number,
            reason: format!(
                "no audio between {} ms and {} ms (audio is {} ms long)",
                start,
                end.map_or_else(|| "end".to_string(), |e| e.to_string()),
                audio.duration_ms()
            ),
        });
    }

    let output = output_dir.join(track_filename(track));
    let bytes = encoder::encode(&slice, OutputFormat::Flac, &output)?;
    write_atomically(&output, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::reporting::MemorySink;
    use pretty_assertions::assert_eq;

    fn track(number: u32, title: Option<&str>, start_ms: Option<u64>) -> CueTrack {
        CueTrack {
            number,
            title: title.map(str::to_string),
            performer: None,
            start_ms,
        }
    }

    #[test]
    fn sanitizing_strips_punctuation() {
        assert_eq!(sanitize_title("My: Song? #1"), "My Song 1");
        assert_eq!(sanitize_title("  AC/DC - Live_Take  "), "ACDC - Live_Take");
        assert_eq!(sanitize_title("Ça va"), "Ça va");
    }

    #[test]
    fn filenames_are_numbered_and_titled() {
        assert_eq!(track_filename(&track(3, Some("My: Song? #1"), None)), "03 - My Song 1.flac");
        assert_eq!(track_filename(&track(7, None, None)), "07 - Track 07.flac");
        assert_eq!(track_filename(&track(12, Some("?!"), None)), "12 - Track 12.flac");
    }

    #[test]
    fn bounds_slice_the_buffer_into_equal_thirds() {
        let tracks = vec![
            track(1, None, Some(0)),
            track(2, None, Some(180_000)),
            track(3, None, Some(360_000)),
        ];
        let audio = AudioBuffer::new(vec![0.0; 540_000], 1000, 1);

        let durations: Vec<u64> = (0..tracks.len())
            .map(|i| {
                let (start, end) = track_bounds(&tracks, i).unwrap();
                audio.slice_ms(start, end).duration_ms()
            })
            .collect();
        assert_eq!(durations, vec![180_000, 180_000, 180_000]);
    }

    #[test]
    fn missing_offsets_fail_the_affected_tracks() {
        let tracks = vec![track(1, None, Some(0)), track(2, None, None), track(3, None, Some(500))];
        assert!(matches!(track_bounds(&tracks, 0), Err(ConvertError::TrackBounds { number: 1, .. })));
        assert!(matches!(track_bounds(&tracks, 1), Err(ConvertError::TrackBounds { number: 2, .. })));
        assert_eq!(track_bounds(&tracks, 2).unwrap(), (500, None));
    }

    #[test]
    fn per_track_failures_do_not_stop_the_split() {
        let dir = tempfile::TempDir::new().unwrap();
        let tracks = vec![
            track(1, Some("Intro"), Some(0)),
            track(2, Some("Ghost"), Some(5_000)),
            track(3, Some("Outro"), Some(500)),
        ];
        let audio = AudioBuffer::new(vec![0.25; 8000], 8000, 1);
        let sink = MemorySink::new();
        let mut seen = Vec::new();

        let failures = split_tracks(&tracks, &audio, dir.path(), &sink, &mut |p| seen.push(p));

        assert_eq!(seen, vec![33, 66, 100]);
        assert!(dir.path().join("01 - Intro.flac").is_file());
        assert!(dir.path().join("03 - Outro.flac").is_file());
        let failed: Vec<&str> = failures.iter().map(|f| f.identifier.as_str()).collect();
        assert_eq!(failed, vec!["Track 2"]);
        assert_eq!(sink.records().len(), 1);
    }
}
