//! Printer operations built on the command queue.

use serde::Serialize;
use tracing::{error, info};

use crate::connection::ProtocolConnection;
use crate::container;
use crate::error::{Error, Result};
use crate::protocol::{device_path, frames, Command, Payload};
use crate::telemetry::{parse_keyed_block, parse_progress, parse_temperatures, PrinterStatus};

/// Diagnostic requests the firmware expects before a file write
const PRE_WRITE_HANDSHAKE: [Command; 4] = [
    Command::Ping,
    Command::GetInfo,
    Command::GetPosition,
    Command::GetProgress,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintReceipt {
    /// On-device path the job was spooled to
    pub path: String,
    /// Output of every step, in order
    pub lines: Vec<String>,
}

impl ProtocolConnection {
    /// Info, machine status, progress and temperatures, one after the other.
    pub async fn status(&self) -> Result<PrinterStatus> {
        let info = self.send(Command::GetInfo).await?;
        let machine = self.send(Command::GetStatus).await?;
        let progress = self.send(Command::GetProgress).await?;
        let temperatures = self.send(Command::GetTemperature).await?;

        let progress = parse_progress(&progress).ok_or_else(|| {
            Error::Protocol(format!("no current/total pair in progress reply {:?}", progress))
        })?;

        Ok(PrinterStatus {
            info: parse_keyed_block(&info),
            machine: parse_keyed_block(&machine),
            progress,
            temperatures: parse_temperatures(&temperatures),
        })
    }

    /// Spools an encoded container and starts printing it.
    ///
    /// Every step is queued up front and runs to the end even after a
    /// failure; the first failure is what the caller gets back.
    pub async fn print(&self, name: &str, container: &[u8]) -> Result<PrintReceipt> {
        let path = device_path(name);
        let blocks = frames(container);
        info!(
            "Spooling {} ({} bytes, {} blocks)",
            path,
            container.len(),
            blocks.len()
        );

        let mut steps: Vec<Payload> = PRE_WRITE_HANDSHAKE.iter().cloned().map(Payload::from).collect();
        steps.push(
            Command::BeginWrite {
                length: container.len(),
                path: path.clone(),
            }
            .into(),
        );
        steps.extend(blocks.map(Payload::from));
        steps.push(Command::EndWrite.into());
        steps.push(Command::StartPrint { path: path.clone() }.into());
        steps.push(Command::GetStatus.into());

        let mut lines = Vec::new();
        let mut first_error = None;
        for reply in self.enqueue_all(steps) {
            match reply.wait().await {
                Ok(output) => lines.extend(output),
                Err(e) if first_error.is_none() => {
                    error!("Print of {} failed: {}", path, e);
                    first_error = Some(e);
                }
                Err(_) => {}
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Started {}", path);
                Ok(PrintReceipt { path, lines })
            }
        }
    }

    /// Wraps raw G-code in a container, then prints it.
    pub async fn print_gcode(
        &self,
        name: &str,
        toolpath: &[u8],
        thumbnail: &[u8],
        print_seconds: u32,
        filament_mm: u32,
    ) -> Result<PrintReceipt> {
        let encoded = container::encode(toolpath, thumbnail, print_seconds, filament_mm);
        self.print(name, &encoded).await
    }

    pub async fn set_name(&self, name: &str) -> Result<Vec<String>> {
        self.send(Command::SetName(name.to_string())).await
    }

    pub async fn cancel(&self) -> Result<Vec<String>> {
        self.send(Command::CancelPrint).await
    }

    /// Takes exclusive control of the printer.
    pub async fn control(&self) -> Result<Vec<String>> {
        self.send(Command::AcquireControl).await
    }

    pub async fn release(&self) -> Result<Vec<String>> {
        self.send(Command::ReleaseControl).await
    }
}
