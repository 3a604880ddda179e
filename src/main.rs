use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use line21::{Cue, FrameRate, SccOptions};

#[derive(Parser)]
#[command(
    name = "line21",
    version,
    about = "Encode, decode and verify CEA-608 caption documents (SCC and MCC)"
)]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an SCC document from a JSON cue list
    Encode {
        /// Cue list as a JSON array, or - for stdin
        cues: PathBuf,
        #[command(flatten)]
        options: EncodeArgs,
        /// Write the document here (atomically) instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate an MCC document from a JSON cue list
    Mcc {
        /// Cue list as a JSON array, or - for stdin
        cues: PathBuf,
        #[command(flatten)]
        options: EncodeArgs,
        /// Write the document here (atomically) instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Decode an SCC document back into cues
    Decode {
        /// SCC file, or - for stdin
        file: PathBuf,
        /// Frame rate to interpret timecodes with
        #[arg(long)]
        fps: Option<f64>,
    },
    /// Check an SCC document for structural problems
    Verify {
        /// SCC file, or - for stdin
        file: PathBuf,
        /// Frame rate to interpret timecodes with
        #[arg(long)]
        fps: Option<f64>,
        /// Cap on recorded issue details
        #[arg(long, default_value_t = 50)]
        max_errors: usize,
    },
}

#[derive(Args)]
struct EncodeArgs {
    /// Frame rate, e.g. 29.97
    #[arg(long)]
    fps: Option<f64>,
    /// Use non-drop timecode labels
    #[arg(long)]
    non_drop: bool,
    /// Permit non-drop labels at 29.97 fps
    #[arg(long)]
    allow_ndf: bool,
    /// Caption channel 1-4
    #[arg(long)]
    channel: Option<u8>,
    /// Timecode of program start, e.g. 00:59:58;00
    #[arg(long)]
    start_tc: Option<String>,
    /// Fail on characters with no 608 mapping
    #[arg(long)]
    strict: bool,
    /// Allow the scheduler to shorten captions that would appear late
    #[arg(long)]
    mitigate_late: bool,
}

impl EncodeArgs {
    fn to_options(&self) -> Result<SccOptions, String> {
        let mut opts = SccOptions::default();
        if let Some(fps) = self.fps {
            opts.frame_rate =
                FrameRate::from_fps(fps).ok_or_else(|| format!("unsupported frame rate {fps}"))?;
        }
        if self.non_drop {
            opts.drop_frame = false;
        } else if !opts.frame_rate.is_ntsc() || opts.frame_rate.nominal() % 30 != 0 {
            opts.drop_frame = false;
        }
        opts.allow_ndf = self.allow_ndf;
        if let Some(n) = self.channel {
            opts.channel = line21::Channel::from_number(n)
                .ok_or_else(|| format!("channel must be 1-4, got {n}"))?;
        }
        opts.start_tc = self.start_tc.clone();
        opts.strict_characters = self.strict;
        opts.late_eoc_mitigation.enabled = self.mitigate_late;
        Ok(opts)
    }
}

fn read_input(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("reading stdin: {e}"))?;
        Ok(buffer)
    } else {
        fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))
    }
}

fn read_cues(path: &Path) -> Result<Vec<Cue>, String> {
    let text = read_input(path)?;
    serde_json::from_str(&text).map_err(|e| format!("parsing cue JSON: {e}"))
}

/// Write through a temp file and rename so a crash never leaves a partial
/// document at the target path.
fn write_atomic(path: &Path, text: &str) -> Result<(), String> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, text).map_err(|e| format!("writing {}: {e}", tmp.display()))?;
    fs::rename(&tmp, path).map_err(|e| format!("renaming onto {}: {e}", path.display()))
}

fn rate_arg(fps: Option<f64>) -> Result<Option<FrameRate>, String> {
    fps.map(|f| FrameRate::from_fps(f).ok_or_else(|| format!("unsupported frame rate {f}")))
        .transpose()
}

fn emit_document(
    text: &str,
    stats: &line21::ScheduleStats,
    out: Option<&Path>,
    format: OutputFormat,
) -> Result<(), String> {
    if stats.late_eoc_count > 0 {
        eprintln!(
            "warning: {} caption(s) appear late, worst {:.2}s",
            stats.late_eoc_count, stats.max_late_eoc_sec
        );
    }
    match out {
        Some(path) => {
            write_atomic(path, text)?;
            if format == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::json!({ "status": "success", "path": path.display().to_string(), "stats": stats })
                );
            }
            Ok(())
        }
        None => {
            if format == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::json!({ "status": "success", "text": text, "stats": stats })
                );
            } else {
                print!("{text}");
            }
            Ok(())
        }
    }
}

fn run(cli: Cli) -> Result<i32, String> {
    match cli.command {
        Command::Encode { cues, options, out } => {
            let opts = options.to_options()?;
            let cues = read_cues(&cues)?;
            let output = line21::generate_scc(&cues, &opts).map_err(|e| e.to_string())?;
            emit_document(&output.text, &output.stats, out.as_deref(), cli.output)?;
            Ok(0)
        }
        Command::Mcc { cues, options, out } => {
            let opts = options.to_options()?;
            let cues = read_cues(&cues)?;
            let output = line21::generate_mcc(&cues, &opts).map_err(|e| e.to_string())?;
            emit_document(&output.text, &output.stats, out.as_deref(), cli.output)?;
            Ok(0)
        }
        Command::Decode { file, fps } => {
            let text = read_input(&file)?;
            let rate = rate_arg(fps)?;
            let document = line21::decode_scc(&text, rate).map_err(|e| e.to_string())?;
            if cli.output == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?
                );
            } else {
                for cue in &document.cues {
                    let end = cue
                        .end
                        .map(|e| format!("{e:.3}"))
                        .unwrap_or_else(|| "-".into());
                    println!("{:.3} --> {}", cue.start, end);
                    for line in &cue.lines {
                        println!("  {line}");
                    }
                }
            }
            Ok(0)
        }
        Command::Verify { file, fps, max_errors } => {
            let text = read_input(&file)?;
            let rate = rate_arg(fps)?;
            let report = line21::verify_scc(&text, rate, max_errors);
            if cli.output == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?
                );
            } else {
                println!("{}", report.summary());
                for issue in &report.issues {
                    println!("  line {}: {}", issue.line, issue.message);
                }
            }
            Ok(if report.ok { 0 } else { 1 })
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(message) => {
            eprintln!("Error: {message}");
            process::exit(2);
        }
    }
}
