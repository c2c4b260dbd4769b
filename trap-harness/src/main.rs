use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use trap_harness::script::Script;
use trap_harness::testcase::{LabelMap, decode_table};
use trap_harness::{ByteOrder, HaltReason, Harness, HarnessConfig, ResumeStep, TrapOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// Append the raw cause of every trap to the result log
    #[arg(long, global = true)]
    record_causes: bool,

    /// Derive the resume step from the trapping instruction (2 for compressed)
    #[arg(long, global = true)]
    decode_length: bool,

    /// Result log and test tables are big-endian
    #[arg(long, global = true)]
    big_endian: bool,

    /// Result log capacity in 8-byte words
    #[arg(long, global = true, default_value_t = 512)]
    log_words: usize,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Replay a trap script and report each trap
    Replay {
        script: PathBuf,

        /// Write the hex signature of the result log here
        #[arg(long)]
        signature: Option<PathBuf>,

        /// Write the raw result log bytes here
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Save a snapshot of the final harness state
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Start from a saved snapshot instead of a fresh harness
        #[arg(long)]
        restore: Option<PathBuf>,
    },
    /// Decode and list a binary test-case table
    Cases { table: PathBuf },
}

fn print_section(title: &str) {
    println!();
    println!("\x1b[1;33m── {} \x1b[0m", title);
}

fn print_info(key: &str, value: &str) {
    println!("    \x1b[0;90m├─\x1b[0m \x1b[0;37m{:<20}\x1b[0m \x1b[1;97m{}\x1b[0m", key, value);
}

fn describe(outcome: &TrapOutcome) -> String {
    match outcome {
        TrapOutcome::Resumed { pc, mode } => format!("resumed in {:?} at 0x{:016x}", mode, pc),
        TrapOutcome::Halted(HaltReason::Pass) => "halted: pass".to_string(),
        TrapOutcome::Halted(HaltReason::Fail(code)) => format!("halted: fail 0x{:x}", code),
        TrapOutcome::Halted(HaltReason::Fatal(cause)) => format!("halted: unexpected cause 0x{:x}", cause),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let byte_order = if args.big_endian {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
    let config = HarnessConfig {
        resume_step: if args.decode_length {
            ResumeStep::DecodeLength
        } else {
            ResumeStep::Fixed
        },
        record_causes: args.record_causes,
        log_capacity: args.log_words,
        byte_order,
        ..HarnessConfig::default()
    };

    match args.command {
        Cmd::Replay {
            script,
            signature,
            dump,
            snapshot,
            restore,
        } => {
            let text = fs::read_to_string(&script)?;
            let script = Script::parse(&text)?;
            let mut harness = match restore {
                Some(path) => Harness::load_snapshot_from_path(path)?,
                None => Harness::new(config),
            };

            print_section("REPLAY");
            print_info("Commands", &script.len().to_string());
            for report in script.run(&mut harness)? {
                print_info(&format!("line {}", report.line), &describe(&report.outcome));
            }

            print_section("RESULT");
            print_info("Mode", &format!("{:?}", harness.cpu.mode));
            print_info("PC", &format!("0x{:016x}", harness.cpu.pc));
            print_info("State", &format!("{:?}", harness.state()));
            print_info("Log words", &harness.log.len().to_string());

            if let Some(path) = signature {
                fs::write(&path, harness.log.signature())?;
                print_info("Signature", &path.display().to_string());
            }
            if let Some(path) = dump {
                fs::write(&path, harness.log.to_bytes(harness.config().byte_order))?;
                print_info("Log dump", &path.display().to_string());
            }
            if let Some(path) = snapshot {
                harness.save_snapshot_to_path(&path)?;
                print_info("Snapshot", &path.display().to_string());
            }

            if let Some(HaltReason::Fail(_) | HaltReason::Fatal(_)) = harness.halt_reason() {
                std::process::exit(1);
            }
        }
        Cmd::Cases { table } => {
            let bytes = fs::read(&table)?;
            let cases = decode_table(&bytes, byte_order)?;
            let labels = LabelMap::indexed();

            print_section("TEST CASES");
            for (i, case) in cases.iter().enumerate() {
                let kind = labels
                    .get(case.tag)
                    .map_or_else(|| format!("<label 0x{:x}>", case.label()), |k| k.to_string());
                print_info(
                    &format!("#{}", i),
                    &format!("{:<18} address=0x{:016x} value=0x{:x}", kind, case.address, case.value),
                );
            }
        }
    }

    Ok(())
}
