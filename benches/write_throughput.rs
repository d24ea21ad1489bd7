//! Throughput of the normal-mode write path
//!
//! Pushes a fixed amount of PCM through `write_all` and `drain` into an
//! instant mock sink, for each slot duration, so the numbers measure queue
//! hand-off and worker wake-up cost rather than device pacing.

use audio_stream::{AudioRenderer, AudioStreamParams, MockSink, StreamConfig};
use std::time::{Duration, Instant};

/// Seconds of CD-quality audio written per run
const AUDIO_SECONDS: usize = 2;

fn run_once(buffer_ms: u64, buffer_count: usize, pcm: &[u8]) -> f64 {
    let config = StreamConfig::default()
        .with_buffer_duration(Duration::from_millis(buffer_ms))
        .with_buffer_count(buffer_count)
        .with_worker_poll_interval(Duration::from_millis(1));
    let sink = MockSink::new();
    let played = sink.handle();

    let renderer = AudioRenderer::new(sink, config).expect("renderer");
    renderer
        .set_params(AudioStreamParams::cd_quality())
        .expect("set_params");
    renderer.start().expect("start");

    let start = Instant::now();
    renderer.write_all(pcm).expect("write_all");
    renderer.drain().expect("drain");
    let elapsed = start.elapsed();

    renderer.release().expect("release");
    assert_eq!(played.written_len(), pcm.len());
    elapsed.as_secs_f64() * 1000.0
}

fn benchmark_write(buffer_ms: u64, buffer_count: usize) {
    let params = AudioStreamParams::cd_quality();
    let bytes = AUDIO_SECONDS * params.sampling_rate.hz() as usize * params.frame_size();
    let pcm: Vec<u8> = (0..bytes).map(|i| i as u8).collect();

    for _ in 0..3 {
        run_once(buffer_ms, buffer_count, &pcm);
    }

    let num_runs = 10;
    let mut times: Vec<f64> = (0..num_runs)
        .map(|_| run_once(buffer_ms, buffer_count, &pcm))
        .collect();

    times.sort_by(|a, b| a.total_cmp(b));
    let mean = times.iter().sum::<f64>() / times.len() as f64;
    let median = times[times.len() / 2];
    let std_dev =
        (times.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / times.len() as f64).sqrt();
    let realtime_factor = (AUDIO_SECONDS as f64 * 1000.0) / mean;

    println!(
        "{buffer_ms:>2} ms x {buffer_count:>2} slots: {mean:.2}ms ± {std_dev:.2}ms \
         (median: {median:.2}ms, range: {:.2}-{:.2}ms, {realtime_factor:.0}x real time)",
        times[0],
        times[times.len() - 1],
    );
}

fn main() {
    println!("audio_stream write throughput");
    println!("=============================");
    println!("{AUDIO_SECONDS}s of 44.1 kHz stereo S16LE per run");
    println!();

    for (buffer_ms, buffer_count) in [(5, 3), (10, 3), (20, 3), (20, 8)] {
        benchmark_write(buffer_ms, buffer_count);
    }
}
