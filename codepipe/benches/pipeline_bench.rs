//! Benchmarks for pipeline state operations and full runs.

use codepipe::config::RunOptions;
use codepipe::core::{FeedbackType, StageSequence};
use codepipe::feedback::prioritize_feedback;
use codepipe::state::PipelineState;
use codepipe::testing::PipelineHarness;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn transition_benchmark(c: &mut Criterion) {
    let sequence = StageSequence::default();
    c.bench_function("is_valid_transition", |b| {
        b.iter(|| {
            black_box(sequence.is_valid_transition(
                black_box("implementation_planning"),
                black_box("implementation_writing"),
            ))
        });
    });
}

fn state_benchmark(c: &mut Criterion) {
    let sequence = StageSequence::default();
    let Ok(mut state) = PipelineState::new("bench-task", &sequence) else {
        return;
    };
    let types = [
        FeedbackType::Suggestion,
        FeedbackType::Correction,
        FeedbackType::Enhancement,
    ];
    for i in 0..64 {
        let stage = &sequence.stages()[i % sequence.len()];
        let _ = state.add_feedback(stage, &format!("note {i}"), types[i % types.len()], &sequence);
    }

    c.bench_function("prioritize_feedback_64", |b| {
        b.iter(|| black_box(prioritize_feedback(black_box(&state.feedback)).len()));
    });

    c.bench_function("create_checkpoint", |b| {
        b.iter_batched(
            || state.clone(),
            |mut state| black_box(state.create_checkpoint("bench")),
            criterion::BatchSize::SmallInput,
        );
    });
}

fn run_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let options = RunOptions::new().with_checkpoints(true);

    c.bench_function("full_run_with_checkpoints", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let Ok(harness) = PipelineHarness::new().await else {
                    return;
                };
                let run = harness
                    .orchestrator()
                    .execute_pipeline(&harness.task.id, &options)
                    .await;
                black_box(run.map(|run| run.is_completed()).unwrap_or(false));
            });
        });
    });
}

criterion_group!(benches, transition_benchmark, state_benchmark, run_benchmark);
criterion_main!(benches);
