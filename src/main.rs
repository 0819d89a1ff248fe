//! Fraud Scoring Service - Main Entry Point
//!
//! Loads the model and scaler once, then scores transactions received over
//! NATS and answers each with a structured response. Requests are scored
//! concurrently, bounded by the configured worker count.

use anyhow::{Context, Result};
use fraud_scoring::{
    config::{AppConfig, LoggingConfig},
    consumer::{self, TransactionConsumer},
    metrics::{MetricsReporter, PipelineMetrics},
    producer::PredictionProducer,
    ScoringError, ScoringResponse, SharedPipeline,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting fraud scoring service");
    info!(
        schema = %config.schema.variant,
        threshold = config.detection.threshold,
        model = %config.models.model_path.display(),
        scaler = %config.models.scaler_path.display(),
        "Configuration loaded"
    );

    // Artifacts are loaded exactly once; a failure here stops the service
    // before it accepts any request.
    let shared = SharedPipeline::new();
    let pipeline = shared
        .get_or_load(&config)
        .context("Cannot start without a working model/scaler pair")?;
    info!(state = ?shared.state(), "Artifacts ready");

    let metrics = Arc::new(PipelineMetrics::new());

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let transaction_consumer =
        TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let producer = Arc::new(PredictionProducer::new(
        client.clone(),
        &config.nats.prediction_subject,
    ));

    let num_workers = config.pipeline.workers;
    info!(
        workers = num_workers,
        subject = %transaction_consumer.subject(),
        fallback_subject = %producer.subject(),
        "Starting scoring loop"
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    if config.pipeline.metrics_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
        tokio::spawn(reporter.start());
    }

    let mut subscription = transaction_consumer.subscribe().await?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let message = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let response = match consumer::decode_form(&message) {
                Ok(form) => pipeline.respond(&form),
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize transaction");
                    ScoringResponse::from_result(
                        consumer::transaction_id_hint(&message.payload),
                        Err(ScoringError::InvalidInput(format!(
                            "malformed transaction payload: {}",
                            e
                        ))),
                    )
                }
            };
            let processing_time = start_time.elapsed();
            metrics.record_response(&response, processing_time);

            if let ScoringResponse::Ok {
                probability,
                is_fraud: true,
                ..
            } = &response
            {
                info!(
                    transaction_id = response.transaction_id().unwrap_or("-"),
                    probability = *probability,
                    processing_time_us = processing_time.as_micros() as u64,
                    "Transaction flagged as fraud"
                );
            }

            if let Err(e) = producer.publish(&response, message.reply.clone()).await {
                error!(
                    transaction_id = response.transaction_id().unwrap_or("-"),
                    error = %e,
                    "Failed to publish scoring response"
                );
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let stats = metrics.get_processing_stats();
                info!(
                    processed = count,
                    throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                    avg_latency_us = stats.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    // Let in-flight requests finish
    if let Err(e) = semaphore.acquire_many(num_workers as u32).await {
        warn!(error = %e, "Could not wait for in-flight requests");
    }

    info!("Scoring service shutting down");
    metrics.print_summary();

    Ok(())
}
