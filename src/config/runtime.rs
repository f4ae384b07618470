// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::local::aggregators;
use crate::config::consts::default_workers;
use crate::config::{ExceptionPolicyConfig, SwitchyardConfig};
use crate::engine::{
    ContinuationPool, Engine, FanOutOptions, FanOutStage, RecoveryOptions, RedeliveryStage,
    ResourcePool, RunGate,
};
use crate::errors::{ConfigError, ValidationError};
use crate::policy::{ExceptionPolicies, ExceptionPolicy, FailureMatcher, RedeliveryPolicy};
use crate::traits::{
    AggregationStrategy, Destination, DestinationResolver, HandleFactory, RecipientSource, Stage,
};
use crate::utils::current_runtime;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Everything a route needs, built from one configuration.
///
/// The pools and the gate are shared: every stage built through this
/// runtime acquires handles from the same [`ResourcePool`] and stops with
/// the same [`RunGate`].
pub struct SwitchyardRuntime {
    pub gate: RunGate,
    pub continuation_pool: Arc<ContinuationPool>,
    pub resource_pool: Arc<ResourcePool>,
    pub exception_policies: ExceptionPolicies,
    pub fan_out: FanOutOptions,
    pub recipients: RecipientSource,
    pub aggregation: Arc<dyn AggregationStrategy>,
    pub recovery: RecoveryOptions,
    pub shutdown_timeout: Duration,
    /// Runtime the pools, timers and parallel children are spawned on.
    pub runtime: Handle,
}

/// Runtime builder - turns a [`SwitchyardConfig`] into policies, options and
/// pools.
///
/// # Examples
///
/// ```
/// use switchyard::backends::local::LocalHandleFactory;
/// use switchyard::config::{RuntimeBuilder, SwitchyardConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = SwitchyardConfig::default();
/// let factory = Arc::new(LocalHandleFactory::new().unwrap());
/// let runtime = RuntimeBuilder::from_config(&config, factory).unwrap();
///
/// assert!(runtime.gate.is_accepting());
/// assert!(runtime.recovery.destination.is_none());
/// # }
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build the runtime on the current Tokio runtime.
    ///
    /// Fails outside a Tokio runtime, and on values that cannot be turned
    /// into policies (unknown aggregation strategy, unparseable delay
    /// pattern). Run [`crate::config::validate_config`] first for the full
    /// set of checks.
    pub fn from_config(
        cfg: &SwitchyardConfig,
        factory: Arc<dyn HandleFactory>,
    ) -> Result<SwitchyardRuntime, ConfigError> {
        let runtime = current_runtime("switchyard runtime")?;
        let exception_policies =
            Self::exception_policies(cfg).map_err(|err| ConfigError::Invalid(vec![err]))?;
        let aggregation = aggregators::from_config(&cfg.fan_out.aggregation)
            .map_err(|err| ConfigError::Invalid(vec![err]))?;

        let continuation_pool = Arc::new(ContinuationPool::on_runtime(
            &runtime,
            "continuations",
            cfg.continuation_pool.workers.unwrap_or_else(default_workers),
            cfg.continuation_pool.queue_capacity,
            cfg.continuation_pool.rejection,
        ));
        let resource_pool = Arc::new(ResourcePool::with_max_idle(
            factory,
            cfg.resource_pool.max_idle_per_destination,
        ));

        let fan_out = FanOutOptions {
            parallel: cfg.fan_out.parallel,
            workers: cfg.fan_out.workers.unwrap_or_else(default_workers),
            streaming: cfg.fan_out.streaming,
            stop_on_exception: cfg.fan_out.stop_on_exception,
            ignore_invalid: cfg.fan_out.ignore_invalid,
            timeout: cfg.fan_out.timeout_ms.map(Duration::from_millis),
            tracker_mode: cfg.fan_out.tracker_mode,
        };

        let recovery = RecoveryOptions {
            destination: cfg.recovery.destination.as_deref().map(Destination::new),
            use_original_body: cfg.recovery.use_original_body,
            handle_recovery_failure: cfg.recovery.handle_recovery_failure,
        };

        Ok(SwitchyardRuntime {
            gate: RunGate::new(),
            continuation_pool,
            resource_pool,
            exception_policies,
            fan_out,
            recipients: RecipientSource::fixed(cfg.fan_out.recipients.iter().cloned()),
            aggregation,
            recovery,
            shutdown_timeout: cfg.engine.shutdown_timeout(),
            runtime,
        })
    }

    /// The policy table: the top-level redelivery section is the default,
    /// each row adds a matcher (empty `on` matches everything).
    pub fn exception_policies(cfg: &SwitchyardConfig) -> Result<ExceptionPolicies, ValidationError> {
        let default_redelivery = Arc::new(cfg.redelivery.to_policy()?);
        let mut policies = ExceptionPolicies::new(default_redelivery);
        for row in &cfg.exception_policies {
            let (matcher, policy) = Self::policy_row(row)?;
            policies.push(matcher, policy);
        }
        Ok(policies)
    }

    fn policy_row(
        row: &ExceptionPolicyConfig,
    ) -> Result<(FailureMatcher, ExceptionPolicy), ValidationError> {
        let matcher = match row.on.as_slice() {
            [] => FailureMatcher::any(),
            [kind] => FailureMatcher::kind(*kind),
            kinds => FailureMatcher::kinds(kinds.to_vec()),
        };
        let mut policy = ExceptionPolicy::new(row.intent);
        if let Some(redelivery) = &row.redelivery {
            let redelivery: RedeliveryPolicy = redelivery.to_policy()?;
            policy = policy.with_redelivery(Arc::new(redelivery));
        }
        Ok((matcher, policy))
    }
}

impl SwitchyardRuntime {
    /// Wrap `inner` with the configured exception policies and recovery.
    pub fn redelivery_stage(&self, name: &str, inner: Arc<dyn Stage>) -> RedeliveryStage {
        RedeliveryStage::builder(name, inner, self.exception_policies.clone())
            .recovery(self.recovery.clone(), Arc::clone(&self.resource_pool))
            .gate(self.gate.clone())
            .build_on(self.runtime.clone())
    }

    /// Fan out to the configured recipients.
    pub fn fan_out_stage(&self, name: &str, resolver: Arc<dyn DestinationResolver>) -> FanOutStage {
        FanOutStage::on_runtime(
            self.runtime.clone(),
            name,
            self.recipients.clone(),
            resolver,
            Arc::clone(&self.resource_pool),
            Arc::clone(&self.aggregation),
            self.fan_out.clone(),
        )
    }

    /// An engine that shares this runtime's gate and shuts its pools down.
    pub fn engine(&self, head: Arc<dyn Stage>) -> Engine {
        Engine::new(head)
            .with_gate(self.gate.clone())
            .with_continuation_pool(Arc::clone(&self.continuation_pool))
            .with_resource_pool(Arc::clone(&self.resource_pool))
            .with_shutdown_timeout(self.shutdown_timeout)
    }
}
