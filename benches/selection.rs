//! Benchmarks for the hot library paths: filtered store queries and
//! criteria resolution over a realistically sized catalog.
//!
//! ```bash
//! cargo bench
//! cargo bench find
//! ```

use std::hint::black_box;
use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, Criterion};

use jockey::history::PlayHistory;
use jockey::selector::{Criteria, Selector};
use jockey::store::Store;
use jockey::track::{Filter, NewTrack};

const CATALOG_SIZE: usize = 1_000;

fn benchmark_store() -> Store {
    let store = Store::open_in_memory().expect("in-memory store");
    let genres = ["Jazz", "Rock", "Funk", "Ambient"];
    for i in 0..CATALOG_SIZE {
        store
            .upsert(&NewTrack {
                path: PathBuf::from(format!("/music/artist{}/track{i}.flac", i % 50)),
                title: format!("Track {i}"),
                artist: Some(format!("Artist {}", i % 50)),
                album: Some(format!("Album {}", i % 120)),
                genre: Some(genres[i % genres.len()].to_string()),
                year: Some(1960 + (i % 60) as i32),
                track_no: Some((i % 12) as u32 + 1),
                duration_secs: Some(180 + (i % 120) as u32),
                format: Some("flac".into()),
                mtime_secs: Some(i as i64),
            })
            .expect("seed track");
    }
    store
}

fn bench_find(c: &mut Criterion) {
    let store = benchmark_store();

    c.bench_function("find_by_artist_substring", |b| {
        b.iter(|| {
            let hits = store.find(black_box(&Filter::by_artist("Artist 7"))).unwrap();
            black_box(hits)
        })
    });

    c.bench_function("find_by_year_range", |b| {
        b.iter(|| {
            let hits = store.find(black_box(&Filter::by_years(1980, 1989))).unwrap();
            black_box(hits)
        })
    });
}

fn bench_resolve(c: &mut Criterion) {
    let store = benchmark_store();

    // A full history ring makes recommendation do its worst-case work.
    let mut history = PlayHistory::new();
    for id in 1..=200 {
        history.record_start(id);
        if id % 2 == 0 {
            history.mark_last_completed();
        }
    }

    c.bench_function("resolve_genre_shuffle", |b| {
        let mut selector = Selector::seeded(17);
        b.iter(|| {
            let queue = selector
                .resolve(
                    black_box(&Criteria::Genre { genre: "Jazz".into() }),
                    &store,
                    &history,
                )
                .unwrap();
            black_box(queue)
        })
    });

    c.bench_function("resolve_recommend_weighted", |b| {
        let mut selector = Selector::seeded(17);
        b.iter(|| {
            let queue = selector
                .resolve(black_box(&Criteria::Recommend), &store, &history)
                .unwrap();
            black_box(queue)
        })
    });
}

criterion_group!(benches, bench_find, bench_resolve);
criterion_main!(benches);
