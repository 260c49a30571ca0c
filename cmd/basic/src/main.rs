//! Basic LEAP example
//!
//! Three modules in a pipeline joined by named channels:
//! `source` → "raw" → `double` → "doubled" → `sink`.
//!
//! # Environment Variables
//!
//! - `LEAP_LOG_LEVEL=debug` - Log level (off, error, warn, info, debug, trace)
//! - `LEAP_NUM_WORKERS=<n>` - Worker threads
//! - `LEAP_BASIC_COUNT=<n>` - Values pushed through the pipeline (default 1000)

use leap::{env_get, kinfo, Context, ExecuteSummary, LeapResult, RuleScheduler, RuntimeConfig};

// LEAP_LOG_LEVEL=debug cargo run -p leap-basic
fn main() -> LeapResult<()> {
    println!("=== LEAP Basic Example ===\n");

    let count: u64 = env_get("LEAP_BASIC_COUNT", 1000);
    let config = RuntimeConfig::from_env();
    config.print();

    let mut ctx = Context::with_config(config);
    ctx.install_signal_finish()?;

    let summary = run_pipeline(&mut ctx, count)?;
    println!("\n{}", summary_line(&summary));
    println!("\n=== Example Complete ===");
    Ok(())
}

fn summary_line(summary: &ExecuteSummary) -> String {
    format!(
        "{} modules, {} rule firings, {} stalls in {:?}",
        summary.modules.len(),
        summary.fired,
        summary.stalls,
        summary.elapsed
    )
}

fn run_pipeline(ctx: &mut Context, count: u64) -> LeapResult<ExecuteSummary> {
    ctx.elaborate(|c| {
        let raw = c.send::<u64>("raw")?;
        c.register_module(RuleScheduler::new("source", (raw, 0u64)).rule(
            "emit",
            |(tx, _)| tx.not_full(),
            move |(tx, n), r| {
                tx.enq(*n);
                *n += 1;
                if *n == count {
                    r.finish();
                }
            },
        ))?;

        let input = c.recv::<u64>("raw")?;
        let output = c.send::<u64>("doubled")?;
        c.register_module(
            RuleScheduler::new("double", (input, output, 0u64))
                // Higher priority: drain before checking for the end
                .rule(
                    "forward",
                    |(rx, tx, _)| rx.not_empty() && tx.not_full(),
                    |(rx, tx, seen), _| {
                        if let Some(v) = rx.deq() {
                            tx.enq(v * 2);
                            *seen += 1;
                        }
                    },
                )
                .rule("done", move |(_, _, seen)| *seen == count, |_, r| r.finish()),
        )?;

        let doubled = c.recv::<u64>("doubled")?;
        c.register_module(RuleScheduler::new("sink", (doubled, 0u64, 0u64)).rule(
            "take",
            |(rx, _, _)| rx.not_empty(),
            move |(rx, sum, seen), r| {
                if let Some(v) = rx.deq() {
                    *sum += v;
                    *seen += 1;
                }
                if *seen == count {
                    kinfo!("sink: sum of {} doubled values = {}", count, sum);
                    r.finish();
                }
            },
        ))?;
        Ok(())
    })?;

    let report = ctx.route()?;
    println!("Routed: {} channels bound, {} dangling", report.bound, report.dangling.len());

    ctx.execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pipeline_summary() {
        let config = RuntimeConfig::new().num_workers(2).park_timeout(Duration::from_millis(1));
        let mut ctx = Context::with_config(config);
        let summary = run_pipeline(&mut ctx, 20).unwrap();
        assert_eq!(summary.modules.len(), 3);
        assert!(summary_line(&summary).starts_with("3 modules, "));
    }
}
