// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::backends::local::aggregators::{FnAggregation, GroupedBody};
use crate::backends::local::{LocalHandleFactory, StaticResolver};
use crate::backends::stub::{
    DelayedStage, FailingStage, FlakyStage, RecordingHooks, StubHandleFactory,
};
use crate::config::{
    FanOutConfig, RecoveryConfig, RedeliveryConfig, RuntimeBuilder, SwitchyardConfig,
};
use crate::engine::{
    ContinuationPool, Engine, FanOutOptions, FanOutStage, HandoffStage, Pipeline,
    RedeliveryStage, RejectionPolicy, ResourcePool, ScopeStage,
};
use crate::errors::{FailureKind, TaskFailure};
use crate::policy::RedeliveryPolicy;
use crate::task::{keys, RollbackScope, Task};
use crate::traits::{
    run, AggregationStrategy, Continuation, FnStage, RecipientSource, ScopeHooks, Stage,
};
use crate::utils::lock;

/// End-to-end tests for routes assembled from the engine's stages
#[cfg(test)]
mod tests {
    use super::*;

    fn counted(count: &Arc<AtomicUsize>) -> Continuation {
        let count = Arc::clone(count);
        Continuation::new(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn labelled(label: &'static str, delay: Duration) -> Arc<dyn Stage> {
        Arc::new(Pipeline::new(
            label,
            vec![
                Arc::new(DelayedStage::new(label, delay)) as Arc<dyn Stage>,
                Arc::new(FnStage::new(label, move |task: &mut Task| task.set_body(label))),
            ],
        ))
    }

    fn fan_out(
        pool: &Arc<ResourcePool>,
        recipients: &[&str],
        strategy: Arc<dyn AggregationStrategy>,
        options: FanOutOptions,
    ) -> FanOutStage {
        FanOutStage::new(
            "fan-out",
            RecipientSource::fixed(recipients.iter().copied()),
            Arc::new(StaticResolver::passthrough()),
            Arc::clone(pool),
            strategy,
            options,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_flaky_stage_recovers_after_backoff() {
        let flaky = Arc::new(FlakyStage::new(2));
        let policy = RedeliveryPolicy::default()
            .maximum_redeliveries(2)
            .initial_delay(Duration::from_millis(10))
            .backoff_multiplier(2.0);
        let engine = Engine::new(Arc::new(
            RedeliveryStage::new("flaky", flaky.clone(), policy).unwrap(),
        ));

        let started = Instant::now();
        let task = engine.submit(Task::new("payload")).await.unwrap();

        assert_eq!(flaky.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!task.is_failed());
        assert_eq!(task.outcome().as_str(), "success");
        assert_eq!(task.header(keys::REDELIVERY_COUNTER), Some(&json!(2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_fan_out_skips_destination_that_cannot_be_created() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let strategy = FnAggregation::new("counted_grouped", move |accumulator, next| {
            counter.fetch_add(1, Ordering::SeqCst);
            GroupedBody.aggregate(accumulator, next)
        });
        let pool = Arc::new(ResourcePool::new(Arc::new(
            StubHandleFactory::new().failing("billing"),
        )));
        let stage = fan_out(
            &pool,
            &["audit", "billing", "archive"],
            Arc::new(strategy),
            FanOutOptions {
                parallel: true,
                workers: 3,
                ignore_invalid: true,
                ..FanOutOptions::default()
            },
        );

        let task = run(&stage, Task::new("order")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!task.is_failed());
        let mut bodies: Vec<String> = task
            .body()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        bodies.sort();
        assert_eq!(bodies, vec!["archive", "audit"]);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_continuation_fires_exactly_once_on_every_path() {
        let pool = Arc::new(ResourcePool::new(Arc::new(
            StubHandleFactory::new()
                .with_stage("slow", Arc::new(DelayedStage::new("slow", Duration::from_millis(60)))),
        )));
        let stopped = Arc::new(
            ContinuationPool::new("stopped", 1, 1, RejectionPolicy::Abort).unwrap(),
        );
        stopped.shutdown().await;

        let stages: Vec<(&str, Arc<dyn Stage>)> = vec![
            ("success", Arc::new(FnStage::new("noop", |_: &mut Task| {})) as Arc<dyn Stage>),
            ("failure", Arc::new(FailingStage::new(FailureKind::Terminal)) as Arc<dyn Stage>),
            (
                "timeout",
                Arc::new(fan_out(
                    &pool,
                    &["slow", "slow"],
                    Arc::new(GroupedBody),
                    FanOutOptions {
                        parallel: true,
                        workers: 2,
                        timeout: Some(Duration::from_millis(5)),
                        ..FanOutOptions::default()
                    },
                )) as Arc<dyn Stage>,
            ),
            ("rejection", Arc::new(HandoffStage::new(Arc::clone(&stopped))) as Arc<dyn Stage>),
            (
                "redelivery",
                Arc::new(
                    RedeliveryStage::new(
                        "retry",
                        Arc::new(FlakyStage::new(1)),
                        RedeliveryPolicy::default()
                            .maximum_redeliveries(1)
                            .initial_delay(Duration::from_millis(5)),
                    )
                    .unwrap(),
                ) as Arc<dyn Stage>,
            ),
        ];

        let counts: Vec<(&str, Arc<AtomicUsize>)> = stages
            .iter()
            .map(|(path, stage)| {
                let count = Arc::new(AtomicUsize::new(0));
                stage.process(Task::new(*path), counted(&count));
                (*path, count)
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(150)).await;

        for (path, count) in counts {
            assert_eq!(count.load(Ordering::SeqCst), 1, "path: {}", path);
        }
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_fan_out_mode_releases_what_it_acquires() {
        let factory = StubHandleFactory::new()
            .failing("broken")
            .with_stage("slow", Arc::new(DelayedStage::new("slow", Duration::from_millis(40))))
            .with_stage("bad", Arc::new(FailingStage::new(FailureKind::Terminal)));
        let pool = Arc::new(ResourcePool::with_max_idle(Arc::new(factory), 1));

        let sequential = FanOutOptions {
            parallel: false,
            ..FanOutOptions::default()
        };
        let parallel = FanOutOptions {
            parallel: true,
            workers: 3,
            ..FanOutOptions::default()
        };
        let runs: Vec<(Vec<&str>, FanOutOptions)> = vec![
            (vec!["a", "b", "c"], sequential.clone()),
            (vec!["a", "slow", "b"], parallel.clone()),
            (
                vec!["slow", "slow", "a"],
                FanOutOptions {
                    timeout: Some(Duration::from_millis(5)),
                    ..parallel.clone()
                },
            ),
            (
                vec!["a", "bad", "b", "c"],
                FanOutOptions {
                    stop_on_exception: true,
                    ..sequential.clone()
                },
            ),
            (
                vec!["slow", "bad", "a"],
                FanOutOptions {
                    stop_on_exception: true,
                    ..parallel.clone()
                },
            ),
            (
                vec!["a", "broken", "b"],
                FanOutOptions {
                    ignore_invalid: true,
                    ..parallel.clone()
                },
            ),
            (vec!["a", "b", "broken"], sequential.clone()),
            (
                vec!["a", "b", "c"],
                FanOutOptions {
                    streaming: true,
                    ..parallel
                },
            ),
        ];

        for (recipients, options) in runs {
            let stage = fan_out(&pool, &recipients, Arc::new(GroupedBody), options);
            run(&stage, Task::new("x")).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let stats = pool.stats();
        assert!(stats.acquired > 0);
        assert_eq!(stats.acquired, stats.released);
        assert_eq!(stats.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_always_failing_stage_is_attempted_maximum_plus_one_then_recovered() {
        let factory = Arc::new(LocalHandleFactory::new().unwrap());
        let failing = Arc::new(FailingStage::new(FailureKind::Transient));
        let stage = RedeliveryStage::builder(
            "bounded",
            failing.clone(),
            crate::policy::ExceptionPolicies::new(Arc::new(
                RedeliveryPolicy::default()
                    .maximum_redeliveries(3)
                    .initial_delay(Duration::ZERO),
            )),
        )
        .recovery(
            crate::engine::RecoveryOptions {
                destination: Some("record:dlq".into()),
                ..Default::default()
            },
            Arc::new(ResourcePool::new(factory.clone())),
        )
        .build()
        .unwrap();

        let task = run(&stage, Task::new("poison")).await.unwrap();

        assert_eq!(failing.attempts(), 4);
        assert!(!task.is_failed());
        assert!(task.is_redelivery_exhausted());
        assert_eq!(task.error_handled(), Some(true));
        assert_eq!(
            task.caught_failure().map(|f| f.kind()),
            Some(FailureKind::Transient)
        );
        assert_eq!(factory.recorded("record:dlq"), vec![json!("poison")]);
    }

    #[test]
    fn test_backoff_is_non_decreasing_up_to_maximum() {
        let maximum = Duration::from_secs(5);
        let policy = RedeliveryPolicy::default()
            .initial_delay(Duration::from_millis(7))
            .backoff_multiplier(1.7)
            .maximum_delay(maximum);

        let delays: Vec<Duration> = (1..=60).map(|n| policy.delay_for(n)).collect();

        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|delay| *delay <= maximum));
        assert_eq!(delays.last(), Some(&maximum));
    }

    #[tokio::test]
    async fn test_rollback_mid_redelivery_stops_further_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let guarded = FnStage::new("ledger", move |task: &mut Task| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            task.set_failure(TaskFailure::new(FailureKind::Transient, "lock timeout"));
            if attempt == 2 {
                task.mark_rollback_only(RollbackScope::Route);
            }
        });
        let stage = RedeliveryStage::new(
            "ledger",
            Arc::new(guarded),
            RedeliveryPolicy::default()
                .maximum_redeliveries(10)
                .initial_delay(Duration::ZERO),
        )
        .unwrap();

        let task = run(&stage, Task::new("entry")).await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(task.is_failed());
        assert!(task.is_rollback_only());
        assert!(!task.is_redelivery_exhausted());
    }

    #[tokio::test]
    async fn test_sequential_aggregation_order_is_repeatable() {
        let factory = StubHandleFactory::new()
            .with_stage("d0", labelled("d0", Duration::from_millis(20)))
            .with_stage("d1", labelled("d1", Duration::from_millis(10)))
            .with_stage("d2", labelled("d2", Duration::from_millis(1)))
            .with_stage("d3", labelled("d3", Duration::ZERO));
        let pool = Arc::new(ResourcePool::new(Arc::new(factory)));

        let mut orders = Vec::new();
        for _ in 0..3 {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let strategy = FnAggregation::new("recording", move |accumulator, next: Task| {
                lock(&sink).push(next.body().clone());
                Ok(accumulator.unwrap_or(next))
            });
            let stage = fan_out(
                &pool,
                &["d0", "d1", "d2", "d3"],
                Arc::new(strategy),
                FanOutOptions::default(),
            );
            run(&stage, Task::new("x")).await.unwrap();
            orders.push(lock(&seen).clone());
        }

        let expected: Vec<Value> = vec![json!("d0"), json!("d1"), json!("d2"), json!("d3")];
        assert!(orders.iter().all(|order| *order == expected));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scoped_route_retries_fan_out_until_flaky_destination_recovers() {
        let config = SwitchyardConfig {
            redelivery: RedeliveryConfig {
                maximum_redeliveries: 3,
                initial_delay_ms: 0,
                ..RedeliveryConfig::default()
            },
            fan_out: FanOutConfig {
                parallel: true,
                workers: Some(3),
                stop_on_exception: true,
                recipients: vec![
                    "upper".to_string(),
                    "record:archive".to_string(),
                    "flaky:2".to_string(),
                ],
                aggregation: crate::config::AggregationConfig {
                    strategy: "grouped_body".to_string(),
                    ..Default::default()
                },
                ..FanOutConfig::default()
            },
            recovery: RecoveryConfig {
                destination: Some("record:dead-letter".to_string()),
                use_original_body: true,
                handle_recovery_failure: false,
            },
            ..SwitchyardConfig::default()
        };
        let factory = Arc::new(LocalHandleFactory::new().unwrap());
        let runtime = RuntimeBuilder::from_config(&config, factory.clone()).unwrap();

        let hooks = Arc::new(RecordingHooks::default());
        let fan_out = runtime.fan_out_stage("deliver", Arc::new(StaticResolver::passthrough()));
        let guarded = runtime.redelivery_stage("deliver-with-retry", Arc::new(fan_out));
        let head = ScopeStage::new("order", Arc::new(guarded), runtime.gate.clone())
            .with_hooks(vec![hooks.clone() as Arc<dyn ScopeHooks>]);
        let engine = runtime.engine(Arc::new(head));

        let task = engine.submit(Task::new("hello")).await.unwrap();

        assert!(!task.is_failed(), "unexpected failure: {:?}", task.failure());
        let mut bodies: Vec<&str> = task
            .body()
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        bodies.sort();
        assert_eq!(bodies, vec!["HELLO", "hello", "hello"]);
        assert_eq!(task.header(keys::REDELIVERY_COUNTER), Some(&json!(2)));
        assert_eq!(factory.recorded("record:archive").len(), 3);
        assert!(factory.recorded("record:dead-letter").is_empty());
        assert_eq!(hooks.events(), vec!["begin:order", "end:order"]);
        assert_eq!(task.tracker().map(|t| t.scopes().len()), Some(0));

        engine.shutdown().await;
        assert!(engine.gate().is_torn_down());
        assert_eq!(runtime.resource_pool.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_scoped_route_recovers_to_dead_letter_when_retries_run_out() {
        let config = SwitchyardConfig {
            redelivery: RedeliveryConfig {
                maximum_redeliveries: 1,
                initial_delay_ms: 0,
                ..RedeliveryConfig::default()
            },
            fan_out: FanOutConfig {
                stop_on_exception: true,
                recipients: vec!["upper".to_string(), "flaky:5".to_string()],
                ..FanOutConfig::default()
            },
            recovery: RecoveryConfig {
                destination: Some("record:dead-letter".to_string()),
                use_original_body: true,
                handle_recovery_failure: false,
            },
            ..SwitchyardConfig::default()
        };
        let factory = Arc::new(LocalHandleFactory::new().unwrap());
        let runtime = RuntimeBuilder::from_config(&config, factory.clone()).unwrap();
        let fan_out = runtime.fan_out_stage("deliver", Arc::new(StaticResolver::passthrough()));
        let engine = runtime.engine(Arc::new(
            runtime.redelivery_stage("deliver-with-retry", Arc::new(fan_out)),
        ));

        let task = engine.submit(Task::new("hello")).await.unwrap();

        assert!(!task.is_failed());
        assert!(task.is_redelivery_exhausted());
        assert_eq!(
            task.property(keys::FAILURE_DESTINATION),
            Some(&json!("record:dead-letter"))
        );
        assert_eq!(factory.recorded("record:dead-letter"), vec![json!("hello")]);

        engine.shutdown().await;
    }
}
