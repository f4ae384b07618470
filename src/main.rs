// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::bail;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use switchyard::backends::local::{LocalHandleFactory, StaticResolver};
use switchyard::config::{load_and_validate_config, RuntimeBuilder, SwitchyardConfig};
use switchyard::engine::ScopeStage;
use switchyard::observability::logging::init_default_logging;
use switchyard::task::{keys, Task};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <config.yaml|config.toml> <body text>", args[0]);
        eprintln!("Example: {} configs/switchyard-demo.yaml \"hello world\"", args[0]);
        std::process::exit(1);
    }

    if let Err(e) = init_default_logging() {
        eprintln!("Logging already initialized: {}", e);
    }

    let config_file = &args[1];
    let body = &args[2];

    println!("🚦 Switchyard Route Demo");
    println!("════════════════════════");
    println!("Config: {}", config_file);
    println!("Body:   \"{}\"", body);
    println!();

    let config = load_and_validate_config(config_file)?;
    run_route(&config, body).await
}

/// Build scope -> redelivery -> fan-out from the config, route one task
/// through it and print what happened.
async fn run_route(config: &SwitchyardConfig, body: &str) -> anyhow::Result<()> {
    if config.fan_out.recipients.is_empty() {
        bail!("fan_out.recipients is empty, nothing to route to");
    }
    for key in &config.fan_out.recipients {
        if !LocalHandleFactory::is_kind_available(key) {
            bail!(
                "unknown destination '{}', available kinds: {}",
                key,
                LocalHandleFactory::list_available_kinds().join(", ")
            );
        }
    }

    let factory = Arc::new(LocalHandleFactory::new()?);
    let runtime = RuntimeBuilder::from_config(config, factory.clone())?;

    let fan_out = runtime.fan_out_stage("deliver", Arc::new(StaticResolver::passthrough()));
    let guarded = runtime.redelivery_stage("deliver-with-retry", Arc::new(fan_out));
    let head = ScopeStage::new("demo", Arc::new(guarded), runtime.gate.clone());
    let engine = runtime.engine(Arc::new(head));

    println!("📬 Recipients: {}", config.fan_out.recipients.join(", "));
    println!(
        "🔁 Redelivery: up to {} redeliveries, {} mode fan-out",
        config.redelivery.maximum_redeliveries,
        if config.fan_out.parallel { "parallel" } else { "sequential" }
    );
    println!();

    let started = Instant::now();
    let task = engine
        .submit(Task::new(body).with_header("source", "cli"))
        .await?;
    let elapsed = started.elapsed();

    println!("📊 Result ({:.2?})", elapsed);
    println!("   Outcome:      {}", task.outcome().as_str());
    println!("   Body:         {}", serde_json::to_string_pretty(task.body())?);
    if let Some(counter) = task.header(keys::REDELIVERY_COUNTER) {
        println!("   Redeliveries: {}", counter);
    }
    if let Some(failure) = task.failure() {
        println!("   ❌ Failure:   {}", failure);
        for suppressed in failure.suppressed() {
            println!("      suppressed: {}", suppressed);
        }
    }
    if let Some(caught) = task.caught_failure() {
        println!("   🛟 Caught:    {}", caught);
    }
    if let Some(destination) = task.property(keys::FAILURE_DESTINATION) {
        println!("   Recovered to: {}", destination);
    }

    let mut inboxes: Vec<&str> = config
        .fan_out
        .recipients
        .iter()
        .chain(config.recovery.destination.iter())
        .map(String::as_str)
        .filter(|key| key.starts_with("record:"))
        .collect();
    inboxes.dedup();
    for key in inboxes {
        println!("   📥 {} received {:?}", key, factory.recorded(key));
    }

    engine.shutdown().await;
    Ok(())
}
