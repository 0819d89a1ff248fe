//! Test Transaction Producer
//!
//! Sends sample scoring requests to the service over NATS. Suspicious
//! requests are transfers or cash-outs that empty the sender's account.
//! With `--await-replies` each request waits for its scoring response and
//! the run ends with a tally of verdicts.
//!
//! Usage: test-producer [nats_url] [subject] [count] [suspicious_rate] [delay_ms] [--await-replies]

use anyhow::Context;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Wire shape of a scoring request
#[derive(Debug, Clone, Serialize)]
struct ScoringRequest {
    transaction_id: String,
    #[serde(rename = "type")]
    tx_type: &'static str,
    amount: f64,
    #[serde(rename = "oldbalanceOrg")]
    old_balance_org: f64,
    #[serde(rename = "newbalanceOrig")]
    new_balance_orig: f64,
    #[serde(rename = "oldbalanceDest")]
    old_balance_dest: f64,
    #[serde(rename = "newbalanceDest")]
    new_balance_dest: f64,
}

#[derive(Debug)]
struct ProducerArgs {
    nats_url: String,
    subject: String,
    count: u64,
    suspicious_rate: f64,
    delay: Duration,
    await_replies: bool,
}

impl ProducerArgs {
    fn parse() -> anyhow::Result<Self> {
        let mut await_replies = false;
        let mut positional = Vec::new();
        for arg in std::env::args().skip(1) {
            if arg == "--await-replies" {
                await_replies = true;
            } else {
                positional.push(arg);
            }
        }

        let nth = |i: usize| positional.get(i).map(String::as_str);
        let suspicious_rate: f64 = nth(3).map(str::parse::<f64>).transpose()?.unwrap_or(0.1);
        anyhow::ensure!(
            (0.0..=1.0).contains(&suspicious_rate),
            "suspicious_rate must be within [0, 1], got {}",
            suspicious_rate
        );

        Ok(Self {
            nats_url: nth(0).unwrap_or("nats://localhost:4222").to_string(),
            subject: nth(1).unwrap_or("transactions.score").to_string(),
            count: nth(2).map(str::parse::<u64>).transpose()?.unwrap_or(100),
            suspicious_rate,
            delay: Duration::from_millis(nth(4).map(str::parse::<u64>).transpose()?.unwrap_or(100)),
            await_replies,
        })
    }
}

struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    issued: u64,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            issued: 0,
        }
    }

    fn next(&mut self, suspicious_rate: f64) -> (ScoringRequest, bool) {
        self.issued += 1;
        let suspicious = self.rng.gen_bool(suspicious_rate);
        let request = if suspicious {
            self.draining_transfer()
        } else {
            self.ordinary()
        };
        (request, suspicious)
    }

    fn id(&self) -> String {
        format!("tx_{:012}", self.issued)
    }

    /// A payment, cash-in, debit or cash-out that leaves the sender with a balance
    fn ordinary(&mut self) -> ScoringRequest {
        const TYPES: [&str; 5] = ["PAYMENT", "CASH_IN", "DEBIT", "PAYMENT", "CASH_OUT"];
        let tx_type = TYPES[self.rng.gen_range(0..TYPES.len())];
        let old_balance_org = round2(self.rng.gen_range(1_000.0..200_000.0));
        let amount = round2(self.rng.gen_range(10.0..old_balance_org * 0.5));
        let old_balance_dest = round2(self.rng.gen_range(0.0..500_000.0));

        let (new_balance_orig, new_balance_dest) = match tx_type {
            "CASH_IN" => (old_balance_org + amount, (old_balance_dest - amount).max(0.0)),
            _ => (old_balance_org - amount, old_balance_dest + amount),
        };

        ScoringRequest {
            transaction_id: self.id(),
            tx_type,
            amount,
            old_balance_org,
            new_balance_orig: round2(new_balance_orig),
            old_balance_dest,
            new_balance_dest: round2(new_balance_dest),
        }
    }

    /// A transfer or cash-out moving the sender's whole balance
    fn draining_transfer(&mut self) -> ScoringRequest {
        let tx_type = if self.rng.gen_bool(0.5) { "TRANSFER" } else { "CASH_OUT" };
        let amount = round2(self.rng.gen_range(50_000.0..2_000_000.0));
        let old_balance_dest = round2(self.rng.gen_range(0.0..100_000.0));

        ScoringRequest {
            transaction_id: self.id(),
            tx_type,
            amount,
            old_balance_org: amount,
            new_balance_orig: 0.0,
            old_balance_dest,
            new_balance_dest: round2(old_balance_dest + amount),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Default)]
struct Tally {
    sent: u64,
    suspicious: u64,
    flagged: u64,
    safe: u64,
    errors: u64,
}

impl Tally {
    fn record_reply(&mut self, reply: &serde_json::Value) {
        match reply.get("status").and_then(|s| s.as_str()) {
            Some("ok") if reply.get("is_fraud").and_then(|f| f.as_bool()) == Some(true) => {
                self.flagged += 1
            }
            Some("ok") => self.safe += 1,
            _ => self.errors += 1,
        }
    }
}

async fn run(args: &ProducerArgs, client: Option<&async_nats::Client>) -> anyhow::Result<Tally> {
    let mut generator = RequestGenerator::new();
    let mut tally = Tally::default();

    for i in 1..=args.count {
        let (request, suspicious) = generator.next(args.suspicious_rate);
        tally.sent += 1;
        tally.suspicious += suspicious as u64;

        match client {
            Some(client) => {
                let payload = serde_json::to_vec(&request)?;
                if args.await_replies {
                    let reply = client
                        .request(args.subject.clone(), payload.into())
                        .await
                        .with_context(|| format!("no reply for {}", request.transaction_id))?;
                    let reply: serde_json::Value = serde_json::from_slice(&reply.payload)?;
                    tally.record_reply(&reply);
                } else {
                    client.publish(args.subject.clone(), payload.into()).await?;
                }
            }
            None if i == 1 || i % 10 == 0 => {
                info!("Sample request {}:\n{}", i, serde_json::to_string_pretty(&request)?);
            }
            None => {}
        }

        if i % 10 == 0 {
            info!(sent = tally.sent, suspicious = tally.suspicious, "Progress");
        }
        tokio::time::sleep(args.delay).await;
    }

    if let Some(client) = client {
        client.flush().await?;
    }
    Ok(tally)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    let args = ProducerArgs::parse()?;
    info!(?args, "Starting test producer");

    let client = match async_nats::connect(&args.nats_url).await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "NATS unavailable, printing requests instead of sending them");
            None
        }
    };

    let tally = run(&args, client.as_ref()).await?;
    info!(
        sent = tally.sent,
        suspicious = tally.suspicious,
        flagged = tally.flagged,
        safe = tally.safe,
        errors = tally.errors,
        "Done"
    );

    Ok(())
}
