use cinerec::services::assembly::{paginate, rank_for_user};
use cinerec::services::scoring::action_delta;
use cinerec::{Action, ScoreEntry};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_entries(users: usize, movies_per_user: usize) -> Vec<ScoreEntry> {
    let mut entries = Vec::with_capacity(users * movies_per_user);
    for u in 0..users {
        for m in 0..movies_per_user {
            entries.push(ScoreEntry {
                movie_id: (u * movies_per_user + m) as u64,
                user_id: format!("user-{}", u),
                score: ((u * 7 + m * 3) % 11) as f64,
            });
        }
    }
    entries
}

fn benchmark_ranking(c: &mut Criterion) {
    let entries = synthetic_entries(500, 40);

    c.bench_function("rank_for_user_full_scan", |b| {
        b.iter(|| {
            black_box(rank_for_user(&entries, "user-250"));
        });
    });

    let mine = rank_for_user(&entries, "user-250");
    c.bench_function("rank_for_user_prefiltered", |b| {
        b.iter(|| {
            black_box(rank_for_user(&mine, "user-250"));
        });
    });
}

fn benchmark_pagination(c: &mut Criterion) {
    let candidates: Vec<u64> = (0..5000).collect();

    c.bench_function("paginate_first_page", |b| {
        b.iter(|| {
            black_box(paginate(&candidates, 1, 20));
        });
    });

    c.bench_function("paginate_last_page", |b| {
        b.iter(|| {
            black_box(paginate(&candidates, 250, 20));
        });
    });
}

fn benchmark_weighting(c: &mut Criterion) {
    c.bench_function("action_delta", |b| {
        b.iter(|| {
            for rating in 0..=5u8 {
                black_box(action_delta(Action::Rate, Some(rating)));
            }
            black_box(action_delta(Action::Like, None));
            black_box(action_delta(Action::View, None));
        });
    });
}

criterion_group!(
    benches,
    benchmark_ranking,
    benchmark_pagination,
    benchmark_weighting
);
criterion_main!(benches);
