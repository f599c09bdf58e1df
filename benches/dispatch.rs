//! Dispatch Benchmarks
//!
//! Run with: cargo bench --bench dispatch

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tuneflow_devkit::dispatch::{DispatchOutcome, DispatcherOptions, JobDispatcher};
use tuneflow_devkit::plugins::{
    BundleManifest, HelloWorldPlugin, PluginRegistry, SongPlugin, HELLO_WORLD_BUNDLE,
};
use tuneflow_devkit::protocol::RunPluginRequest;
use tuneflow_devkit::{ExecutionEngine, Song};

fn registry() -> Arc<PluginRegistry> {
    let manifest = BundleManifest::from_json_str(HELLO_WORLD_BUNDLE).unwrap();
    let plugins: Vec<Arc<dyn SongPlugin>> = vec![Arc::new(HelloWorldPlugin)];
    Arc::new(PluginRegistry::register(plugins, manifest).unwrap())
}

fn song_bytes(tracks: usize) -> Vec<u8> {
    let mut song = Song::new();
    for i in 0..tracks {
        let notes = vec![rmpv::Value::from(i as u64); 64];
        song.set(&format!("track-{}", i), notes);
    }
    song.to_bytes().unwrap()
}

fn benchmark_resolve(c: &mut Criterion) {
    let registry = registry();

    c.bench_function("registry_resolve", |b| {
        b.iter(|| {
            registry
                .resolve(black_box("andantei"), black_box("hello-world"))
                .is_ok()
        })
    });
}

fn benchmark_song_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("song_codec");

    for tracks in [1, 16, 128].iter() {
        let bytes = song_bytes(*tracks);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(format!("{}_tracks", tracks), &bytes, |b, bytes| {
            b.iter(|| {
                Song::from_bytes(black_box(bytes))
                    .unwrap()
                    .to_bytes()
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_sync_run(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dispatcher = JobDispatcher::new(
        registry(),
        ExecutionEngine::default(),
        DispatcherOptions::default(),
    );
    let song = song_bytes(16);

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("sync_run", |b| {
        b.to_async(&rt).iter(|| async {
            let request = RunPluginRequest {
                provider_id: "andantei".to_string(),
                plugin_id: "hello-world".to_string(),
                song: song.clone(),
                params: Default::default(),
            };
            let outcome = dispatcher.run_job(request, Default::default()).await;
            assert!(matches!(outcome, DispatchOutcome::Done(ref r) if r.is_ok()));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_resolve,
    benchmark_song_codec,
    benchmark_sync_run
);
criterion_main!(benches);
