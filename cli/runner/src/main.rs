//! sb-runner CLI
//!
//! Runs a script processor or script output over NDJSON messages from stdin.

use clap::Parser;
use sb_cli_common::{format_bytes, format_number, format_rate, init_logging};

mod args;
mod run;

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Logs go to stderr so stdout stays clean for messages
    init_logging(args.log_level)?;

    let stats = run::execute(args).await?;

    eprintln!();
    eprintln!("Runner completed:");
    eprintln!("  Messages read:      {}", format_number(stats.messages_read));
    eprintln!(
        "  Messages processed: {}",
        format_number(stats.messages_processed)
    );
    eprintln!("  Messages failed:    {}", format_number(stats.messages_failed));
    eprintln!("  Bytes read:         {}", format_bytes(stats.bytes_read));
    eprintln!("  Bytes written:      {}", format_bytes(stats.bytes_written));
    eprintln!(
        "  Duration:           {:.2}s",
        stats.elapsed.as_secs_f64()
    );
    if stats.messages_processed > 0 {
        eprintln!(
            "  Throughput:         {} messages",
            format_rate(stats.messages_processed, stats.elapsed)
        );
    }

    if stats.transient_errors > 0 || stats.permanent_errors > 0 {
        eprintln!(
            "  Errors:             {} transient, {} permanent",
            stats.transient_errors, stats.permanent_errors
        );
    }

    if stats.messages_failed > 0 {
        std::process::exit(4); // Partial failure
    }

    Ok(())
}
