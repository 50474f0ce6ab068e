use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gxlink::config::ClientConfig;
use gxlink::{container, GxFile, ProtocolConnection};

#[derive(Parser)]
#[command(name = "gxlink")]
#[command(about = "Drive GX-format 3D printers over their TCP control port")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Config file path (default: gxlink.toml if present)")]
    config: Option<String>,

    #[arg(long, global = true, help = "Printer host (overrides config)")]
    host: Option<String>,

    #[arg(long, global = true, help = "Printer control port (overrides config)")]
    port: Option<u16>,

    #[arg(long, global = true, help = "Connect attempts before giving up (overrides config)")]
    retries: Option<u32>,

    #[arg(long, global = true, help = "Output as JSON")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a G-code or GX file and start printing it
    Print {
        file: PathBuf,
        #[arg(long, help = "Name on the printer (default: source file name)")]
        name: Option<String>,
        #[arg(long, help = "Preview bitmap embedded when encoding")]
        thumbnail: Option<PathBuf>,
        #[arg(long)]
        print_seconds: Option<u32>,
        #[arg(long)]
        filament_mm: Option<u32>,
    },
    /// Show machine info, status, progress and temperatures
    Status,
    /// Rename the printer
    Name { name: String },
    /// Cancel the running job
    Cancel,
    /// Wrap G-code in a GX container
    Encode {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        #[arg(long)]
        print_seconds: Option<u32>,
        #[arg(long)]
        filament_mm: Option<u32>,
    },
    /// Split a GX container into <stem>.bmp and <stem>.gcode
    Decode { input: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gxlink=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = Some(host);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(retries) = cli.retries {
        config.max_attempts = retries;
    }

    match cli.command {
        Commands::Encode { input, output, thumbnail, print_seconds, filament_mm } => {
            let toolpath = read(&input)?;
            let thumbnail = thumbnail.as_deref().map(read).transpose()?.unwrap_or_default();
            let encoded = container::encode(
                &toolpath,
                &thumbnail,
                print_seconds.unwrap_or(config.print_seconds),
                filament_mm.unwrap_or(config.filament_mm),
            );
            std::fs::write(&output, &encoded)
                .with_context(|| format!("writing {}", output.display()))?;
            report(cli.json, serde_json::json!({"output": output, "bytes": encoded.len()}), || {
                println!("✅ Wrote {} ({} bytes)", output.display(), encoded.len());
            })
        }
        Commands::Decode { input } => {
            let bytes = read(&input)?;
            let file = GxFile::decode(&bytes)
                .with_context(|| format!("{} is not a GX container", input.display()))?;
            let bmp = input.with_extension("bmp");
            let gcode = input.with_extension("gcode");
            std::fs::write(&bmp, file.thumbnail)?;
            std::fs::write(&gcode, file.toolpath)?;
            report(
                cli.json,
                serde_json::json!({
                    "magic": file.header.magic,
                    "print_seconds": file.header.print_seconds,
                    "filament_mm": file.header.filament_mm,
                    "thumbnail": bmp,
                    "toolpath": gcode,
                }),
                || {
                    println!("📦 {} ({})", input.display(), file.header.magic);
                    println!("   Print time: {} s", file.header.print_seconds);
                    println!("   Filament: {} mm", file.header.filament_mm);
                    println!("   Thumbnail: {} ({} bytes)", bmp.display(), file.thumbnail.len());
                    println!("   Toolpath: {} ({} bytes)", gcode.display(), file.toolpath.len());
                },
            )
        }
        command => {
            let printer = ProtocolConnection::new(config.address()?, config.connect_options());
            printer
                .connect()
                .await
                .with_context(|| format!("connecting to {}", printer.addr()))?;

            let outcome = run_remote(&printer, command, &config, cli.json).await;
            if let Err(e) = printer.close().await {
                tracing::warn!("Close failed: {}", e);
            }
            outcome
        }
    }
}

async fn run_remote(
    printer: &ProtocolConnection,
    command: Commands,
    config: &ClientConfig,
    json: bool,
) -> Result<()> {
    match command {
        Commands::Print { file, name, thumbnail, print_seconds, filament_mm } => {
            let bytes = read(&file)?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .context("print file has no name")?,
            };

            let receipt = if GxFile::is_container(&bytes) {
                info!("{} is already a GX container", file.display());
                printer.print(&name, &bytes).await?
            } else {
                let thumbnail = thumbnail.as_deref().map(read).transpose()?.unwrap_or_default();
                printer
                    .print_gcode(
                        &name,
                        &bytes,
                        &thumbnail,
                        print_seconds.unwrap_or(config.print_seconds),
                        filament_mm.unwrap_or(config.filament_mm),
                    )
                    .await?
            };
            report(json, serde_json::to_value(&receipt)?, || {
                println!("🖨️  Printing {}", receipt.path);
                for line in &receipt.lines {
                    println!("   {}", line);
                }
            })
        }
        Commands::Status => {
            let status = printer.status().await?;
            report(json, serde_json::to_value(&status)?, || {
                println!("📊 Printer Status");
                println!("=================");
                for (key, value) in status.info.iter().chain(status.machine.iter()) {
                    println!("   {}: {}", key, serde_json::to_string(value).unwrap_or_default());
                }
                println!(
                    "   Progress: {}% ({}/{})",
                    status.progress.percent, status.progress.current, status.progress.total
                );
                for (sensor, [current, target]) in &status.temperatures {
                    println!("   {}: {} / {}", sensor, current, target);
                }
            })
        }
        Commands::Name { name } => {
            let lines = printer.set_name(&name).await?;
            report(json, serde_json::json!({"name": name, "lines": lines}), || {
                println!("✅ Printer renamed to {}", name);
            })
        }
        Commands::Cancel => {
            let lines = printer.cancel().await?;
            report(json, serde_json::json!({"lines": lines}), || {
                println!("🛑 Cancel sent");
            })
        }
        Commands::Encode { .. } | Commands::Decode { .. } => {
            anyhow::bail!("offline command routed to the printer")
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn report(json: bool, value: serde_json::Value, human: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        human();
    }
    Ok(())
}
