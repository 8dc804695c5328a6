//! WAV-file audio source for offline measurement
//!
//! Decodes a WAV file with `hound`, mixes it down to mono and cuts it into one
//! chunk per sampling tick. Each chunk's RMS becomes one [`AudioFrame`], stamped
//! with the chunk's start offset in milliseconds.

use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::audio::frame_queue::{AudioFrame, FrameProducer};
use crate::audio::level::frame_rms;
use crate::error::SessionError;

/// Pre-decoded amplitude frames from a WAV file
#[derive(Debug, Clone)]
pub struct WavSource {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
    tick_interval_ms: u64,
}

impl WavSource {
    /// Decode `path` into one frame per `tick_interval_ms`
    ///
    /// A trailing partial chunk shorter than half a tick is discarded.
    ///
    /// # Errors
    /// `SessionError::SourceFailed` if the file cannot be opened or decoded
    pub fn open<P: AsRef<Path>>(path: P, tick_interval_ms: u64) -> Result<Self, SessionError> {
        let reader = WavReader::open(&path).map_err(|err| SessionError::SourceFailed {
            reason: format!("cannot open {:?}: {}", path.as_ref(), err),
        })?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(decode_error)?,
            SampleFormat::Int => {
                let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(decode_error)?
            }
        };

        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        let source = Self::from_samples(&mono, spec.sample_rate, tick_interval_ms);
        log::info!(
            "[WavSource] Decoded {:?}: {} Hz, {} ch, {} ticks of {} ms",
            path.as_ref(),
            spec.sample_rate,
            channels,
            source.frames.len(),
            tick_interval_ms
        );
        Ok(source)
    }

    /// Chunk already-decoded mono samples into tick frames
    pub fn from_samples(samples: &[f32], sample_rate: u32, tick_interval_ms: u64) -> Self {
        let tick_interval_ms = tick_interval_ms.max(1);
        let chunk_len = ((sample_rate as u64 * tick_interval_ms) / 1000).max(1) as usize;

        let frames = samples
            .chunks(chunk_len)
            .filter(|chunk| chunk.len() * 2 >= chunk_len)
            .enumerate()
            .map(|(i, chunk)| AudioFrame::new(frame_rms(chunk), i as u64 * tick_interval_ms))
            .collect();

        Self {
            frames,
            sample_rate,
            tick_interval_ms,
        }
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// Split into a calibration window (first `window_ms`) and the remaining frames
    pub fn split_reference(&self, window_ms: u64) -> (Vec<f64>, &[AudioFrame]) {
        let split = self
            .frames
            .iter()
            .position(|f| f.timestamp_ms >= window_ms)
            .unwrap_or(self.frames.len());
        let window = self.frames[..split].iter().map(|f| f.amplitude).collect();
        (window, &self.frames[split..])
    }

    /// Push frames into a queue and signal the end of input
    ///
    /// # Returns
    /// Number of frames accepted by the queue
    pub fn feed(frames: &[AudioFrame], producer: &mut FrameProducer) -> usize {
        let accepted = frames.iter().filter(|f| producer.push(**f)).count();
        producer.finish();
        accepted
    }

    /// Like [`feed`](Self::feed) but waits for space instead of dropping
    ///
    /// For offline sources where every frame should be measured. Stops early
    /// if the consumer goes away.
    pub fn feed_blocking(frames: &[AudioFrame], producer: &mut FrameProducer) -> usize {
        let mut accepted = 0;
        for frame in frames {
            let mut pending = *frame;
            while let Err(frame) = producer.try_push(pending) {
                if producer.is_abandoned() {
                    return accepted;
                }
                pending = frame;
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            accepted += 1;
        }
        producer.finish();
        accepted
    }
}

fn decode_error(err: hound::Error) -> SessionError {
    SessionError::SourceFailed {
        reason: format!("WAV decode failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame_queue::FrameQueue;

    #[test]
    fn test_from_samples_chunks_per_tick() {
        // 1 second at 8 kHz, 125 ms ticks -> 8 frames of 1000 samples
        let samples = vec![0.5f32; 8000];
        let source = WavSource::from_samples(&samples, 8000, 125);

        assert_eq!(source.frames().len(), 8);
        assert_eq!(source.frames()[0].timestamp_ms, 0);
        assert_eq!(source.frames()[7].timestamp_ms, 875);
        assert!((source.frames()[3].amplitude - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_short_tail_is_discarded() {
        let samples = vec![0.1f32; 1000 + 300];
        let source = WavSource::from_samples(&samples, 8000, 125);
        assert_eq!(source.frames().len(), 1);

        let samples = vec![0.1f32; 1000 + 600];
        let source = WavSource::from_samples(&samples, 8000, 125);
        assert_eq!(source.frames().len(), 2);
    }

    #[test]
    fn test_split_reference() {
        let samples = vec![0.1f32; 8000 * 3];
        let source = WavSource::from_samples(&samples, 8000, 250);
        let (window, rest) = source.split_reference(1000);
        assert_eq!(window.len(), 4);
        assert_eq!(rest.len(), 8);
        assert_eq!(rest[0].timestamp_ms, 1000);
    }

    #[test]
    fn test_open_roundtrip_int16() {
        let path = std::env::temp_dir().join(format!(
            "noise_meter_wav_{}_int16.wav",
            std::process::id()
        ));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        {
            let mut writer = hound::WavWriter::create(&path, spec).unwrap();
            for _ in 0..8000 {
                writer.write_sample(16384i16).unwrap();
                writer.write_sample(16384i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let source = WavSource::open(&path, 500).unwrap();
        assert_eq!(source.frames().len(), 2);
        assert!((source.frames()[0].amplitude - 0.5).abs() < 1e-4);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_open_missing_file() {
        let result = WavSource::open("/nonexistent/file.wav", 125);
        assert!(matches!(result, Err(SessionError::SourceFailed { .. })));
    }

    #[test]
    fn test_feed_signals_end() {
        let source = WavSource::from_samples(&[0.2f32; 4000], 8000, 125);
        let (mut producer, mut consumer) = FrameQueue::new(16);
        assert_eq!(WavSource::feed(source.frames(), &mut producer), 4);

        let batch = consumer.poll();
        assert_eq!(batch.frames.len(), 4);
        assert!(batch.signal.is_some());
    }

    #[test]
    fn test_feed_blocking_waits_for_space() {
        let source = WavSource::from_samples(&[0.2f32; 8000], 8000, 125);
        let frames = source.frames().to_vec();
        let (mut producer, mut consumer) = FrameQueue::new(2);

        let feeder = std::thread::spawn(move || WavSource::feed_blocking(&frames, &mut producer));

        let mut received = Vec::new();
        loop {
            let batch = consumer.poll();
            received.extend(batch.frames);
            if batch.signal.is_some() {
                break;
            }
            std::thread::yield_now();
        }

        assert_eq!(feeder.join().unwrap(), 8);
        assert_eq!(received.len(), 8);
        assert!(received
            .windows(2)
            .all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert_eq!(consumer.missed_samples(), 0);
    }

    #[test]
    fn test_feed_blocking_stops_when_consumer_dropped() {
        let source = WavSource::from_samples(&[0.2f32; 8000], 8000, 125);
        let (mut producer, consumer) = FrameQueue::new(2);
        drop(consumer);
        assert_eq!(WavSource::feed_blocking(source.frames(), &mut producer), 2);
    }
}
