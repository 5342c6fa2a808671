use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ccip_exec_lib::{
    build_codec_registry, chain_name, load_batch, load_networks, load_output, resolve_batch, verify_output, write_json,
    ManualExec, NetworksFile, ResolvedBatch,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ccip-manual-exec")]
#[command(about = "Build and check CCIP manual-execution reports from on-ramp events")]
struct Cli {
    /// Networks file mapping extra chain selectors to chain families.
    #[arg(long, global = true, env = "CCIP_NETWORKS")]
    networks: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode every event of a batch and print the messages.
    Inspect {
        #[arg(long)]
        batch: PathBuf,
    },
    /// Print the leaf of every message and the root they produce.
    Hash {
        #[arg(long)]
        batch: PathBuf,
    },
    /// Build the execution report for the batch targets.
    Prove {
        #[arg(long)]
        batch: PathBuf,
        #[arg(long, default_value = "build/ccip/report.json")]
        out: PathBuf,
    },
    /// Re-check a written report's proof against its merkle root.
    Verify {
        #[arg(long, default_value = "build/ccip/report.json")]
        report: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ccip_manual_exec=info,ccip_exec_lib=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let networks = cli
        .networks
        .as_deref()
        .map(load_networks)
        .transpose()?;

    match cli.command {
        Command::Inspect { batch } => cmd_inspect(networks.as_ref(), &batch),
        Command::Hash { batch } => cmd_hash(networks.as_ref(), &batch),
        Command::Prove { batch, out } => cmd_prove(networks.as_ref(), &batch, &out),
        Command::Verify { report } => cmd_verify(&report),
    }
}

fn open_batch(networks: Option<&NetworksFile>, path: &Path) -> Result<(ManualExec, ResolvedBatch)> {
    let codecs = build_codec_registry(networks)?;
    let batch = load_batch(path)?;
    let resolved = resolve_batch(&batch, &codecs).with_context(|| format!("invalid batch {}", path.display()))?;

    let lane = resolved.lane;
    let describe = |selector: u64| chain_name(selector, networks).unwrap_or_else(|| selector.to_string());
    tracing::info!(
        source = %describe(lane.source_chain_selector),
        dest = %describe(lane.dest_chain_selector),
        version = %lane.version,
        events = resolved.events.len(),
        "loaded batch"
    );

    Ok((ManualExec::new(codecs), resolved))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value).context("failed encoding json")?;
    println!("{encoded}");
    Ok(())
}

fn cmd_inspect(networks: Option<&NetworksFile>, batch_path: &Path) -> Result<()> {
    let (mut exec, batch) = open_batch(networks, batch_path)?;
    let messages = exec.inspect(&batch)?;
    print_json(&messages)
}

fn cmd_hash(networks: Option<&NetworksFile>, batch_path: &Path) -> Result<()> {
    let (mut exec, batch) = open_batch(networks, batch_path)?;
    let hashed = exec.hash(&batch)?;
    print_json(&hashed)
}

fn cmd_prove(networks: Option<&NetworksFile>, batch_path: &Path, out_path: &Path) -> Result<()> {
    let (mut exec, batch) = open_batch(networks, batch_path)?;
    let output = exec.prove(&batch)?;
    write_json(out_path, &output)?;

    println!("Report: {}", out_path.display());
    println!("Merkle root: {}", output.merkle_root);
    for message in &output.messages {
        println!("Message {} (seq {})", message.message_id, message.sequence_number);
    }
    println!("Proof hashes: {}", output.proofs.len());
    println!("Proof flag bits: {}", output.proof_flag_bits);

    Ok(())
}

fn cmd_verify(report_path: &Path) -> Result<()> {
    let output = load_output(report_path)?;
    let root = verify_output(&output).with_context(|| format!("report {} failed verification", report_path.display()))?;

    println!("Report verified: {}", report_path.display());
    println!("Merkle root: 0x{}", hex::encode(root));
    println!("Messages: {}", output.messages.len());

    Ok(())
}
